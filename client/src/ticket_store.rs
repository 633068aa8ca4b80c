//! Durable cache of one ticket per queue.
//!
//! Records live under `queue_data_{queue_id}` in a [`Storage`] backend. A
//! record is only handed out while it is well-formed, non-terminal, and
//! younger than the staleness threshold; anything else is evicted on sight.
//! Storage failures are logged and swallowed.

use crate::storage::Storage;
use crate::ticket::{Otp, QueueId, Snapshot, Ticket, TicketStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use walkin_core::environment::Clock;

/// Key prefix shared by every ticket record
pub const TICKET_KEY_PREFIX: &str = "queue_data_";

/// Storage key for a queue's ticket
#[must_use]
pub fn ticket_key(queue_id: &QueueId) -> String {
    format!("{TICKET_KEY_PREFIX}{queue_id}")
}

/// Shape of a record as found in storage; every field may be missing
#[derive(Deserialize)]
struct StoredRecord {
    otp: Option<Otp>,
    cashier_number: Option<u32>,
    #[serde(default)]
    position: u32,
    status: Option<TicketStatus>,
    #[serde(default, deserialize_with = "crate::ticket::seconds::deserialize")]
    estimated_wait_seconds: u64,
    last_update: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn into_ticket(self) -> Option<Ticket> {
        Some(Ticket {
            otp: self.otp.filter(|otp| !otp.as_str().is_empty())?,
            cashier_number: Some(self.cashier_number?),
            position: self.position,
            status: self.status?,
            estimated_wait_seconds: self.estimated_wait_seconds,
            last_update: self.last_update,
        })
    }
}

/// Ticket cache over a [`Storage`] backend
pub struct TicketStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    staleness: chrono::Duration,
    write_lock: Mutex<()>,
}

impl TicketStore {
    /// Create a store; records older than `staleness` are invalid
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, staleness: chrono::Duration) -> Self {
        Self {
            storage,
            clock,
            staleness,
            write_lock: Mutex::new(()),
        }
    }

    /// The cached ticket for `queue_id`, if it is still valid
    ///
    /// Malformed, terminal, and stale records are evicted and reported as absent.
    pub fn load(&self, queue_id: &QueueId) -> Option<Ticket> {
        let _guard = self.lock();
        let key = ticket_key(queue_id);

        let ticket = self.read(&key)?;

        if ticket.status.is_terminal() {
            tracing::debug!(%queue_id, status = %ticket.status, "Evicting terminal ticket");
            self.remove(&key);
            return None;
        }

        if self.is_stale(&ticket) {
            tracing::debug!(%queue_id, otp = %ticket.otp, "Evicting stale ticket");
            self.remove(&key);
            return None;
        }

        Some(ticket)
    }

    /// Overwrite the slot for `queue_id`, stamping `last_update`
    ///
    /// A terminal ticket is evicted instead; `None` is returned in that case.
    pub fn save(&self, queue_id: &QueueId, mut ticket: Ticket) -> Option<Ticket> {
        let _guard = self.lock();
        let key = ticket_key(queue_id);

        if ticket.status.is_terminal() {
            self.remove(&key);
            return None;
        }

        ticket.last_update = Some(self.clock.now());
        self.write(&key, &ticket);
        Some(ticket)
    }

    /// Merge `snapshot` into the stored ticket for `otp` in one step
    ///
    /// Without a usable record for `otp`, a new one is seeded from the
    /// snapshot. Terminal statuses evict and return `None`.
    pub fn reconcile(&self, queue_id: &QueueId, otp: &Otp, snapshot: &Snapshot) -> Option<Ticket> {
        let _guard = self.lock();
        let key = ticket_key(queue_id);

        if snapshot.status.is_terminal() {
            tracing::debug!(%queue_id, %otp, status = %snapshot.status, "Terminal status, evicting");
            self.remove(&key);
            return None;
        }

        let mut ticket = self
            .read(&key)
            .filter(|stored| &stored.otp == otp)
            .unwrap_or_else(|| Ticket::from_snapshot(otp.clone(), snapshot));

        ticket.merge(snapshot);
        ticket.last_update = Some(self.clock.now());
        self.write(&key, &ticket);
        Some(ticket)
    }

    /// Remove the ticket for `queue_id`
    pub fn evict(&self, queue_id: &QueueId) {
        let _guard = self.lock();
        self.remove(&ticket_key(queue_id));
    }

    /// Remove every cached ticket; other keys are left alone
    ///
    /// Returns the number of records removed.
    pub fn clear_all(&self) -> usize {
        let _guard = self.lock();

        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to list cached tickets");
                return 0;
            },
        };

        keys.iter()
            .filter(|key| key.starts_with(TICKET_KEY_PREFIX))
            .filter(|key| self.remove(key))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_stale(&self, ticket: &Ticket) -> bool {
        ticket
            .last_update
            .is_some_and(|at| self.clock.now() - at > self.staleness)
    }

    /// Parse the record at `key`; malformed records are evicted
    fn read(&self, key: &str) -> Option<Ticket> {
        let raw = match self.storage.get(key) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(key, error = %error, "Failed to read cached ticket");
                return None;
            },
        };

        match serde_json::from_str::<StoredRecord>(&raw).map(StoredRecord::into_ticket) {
            Ok(Some(ticket)) => Some(ticket),
            Ok(None) => {
                tracing::debug!(key, "Cached ticket missing required fields, evicting");
                self.remove(key);
                None
            },
            Err(error) => {
                tracing::debug!(key, error = %error, "Cached ticket is malformed, evicting");
                self.remove(key);
                None
            },
        }
    }

    fn write(&self, key: &str, ticket: &Ticket) {
        let result = serde_json::to_string(ticket)
            .map_err(crate::error::StorageError::from)
            .and_then(|json| self.storage.set(key, &json));

        if let Err(error) = result {
            tracing::warn!(key, error = %error, "Failed to persist ticket");
        }
    }

    fn remove(&self, key: &str) -> bool {
        match self.storage.remove(key) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(key, error = %error, "Failed to evict ticket");
                false
            },
        }
    }
}

impl std::fmt::Debug for TicketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketStore")
            .field("staleness", &self.staleness)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::storage::MemoryStorage;
    use walkin_testing::{MockClock, mock_clock};

    fn fixture() -> (TicketStore, Arc<MemoryStorage>, Arc<MockClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(mock_clock());
        let store = TicketStore::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            chrono::Duration::hours(24),
        );
        (store, storage, clock)
    }

    fn waiting_ticket() -> Ticket {
        Ticket {
            otp: Otp::new("AB12"),
            cashier_number: Some(3),
            position: 5,
            status: TicketStatus::Waiting,
            estimated_wait_seconds: 600,
            last_update: None,
        }
    }

    fn queue() -> QueueId {
        QueueId::new("queue42")
    }

    #[test]
    fn test_save_then_load_stamps_last_update() {
        let (store, _, clock) = fixture();

        let saved = store.save(&queue(), waiting_ticket()).unwrap();
        assert_eq!(saved.last_update, Some(clock.now()));

        let loaded = store.load(&queue()).unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.view().wait_minutes, 10);
    }

    #[test]
    fn test_stale_ticket_is_evicted_on_load() {
        let (store, storage, clock) = fixture();

        store.save(&queue(), waiting_ticket());
        clock.advance(chrono::Duration::hours(24) + chrono::Duration::seconds(1));

        assert_eq!(store.load(&queue()), None);
        assert_eq!(storage.get("queue_data_queue42").unwrap(), None);
    }

    #[test]
    fn test_ticket_at_threshold_is_still_valid() {
        let (store, _, clock) = fixture();

        store.save(&queue(), waiting_ticket());
        clock.advance(chrono::Duration::hours(24));

        assert!(store.load(&queue()).is_some());
    }

    #[test]
    fn test_legacy_record_without_timestamp_is_accepted() {
        let (store, storage, _) = fixture();
        storage
            .set(
                "queue_data_queue42",
                r#"{"otp":"AB12","cashier_number":3,"position":5,"status":"waiting","estimated_wait_seconds":600}"#,
            )
            .unwrap();

        let ticket = store.load(&queue()).unwrap();
        assert_eq!(ticket.last_update, None);
        assert_eq!(ticket.position, 5);
    }

    #[test]
    fn test_malformed_records_are_evicted_silently() {
        let (store, storage, _) = fixture();

        for raw in [
            "not json",
            r#"{"otp":"AB12","status":"waiting"}"#,
            r#"{"cashier_number":3,"status":"waiting"}"#,
            r#"{"otp":"AB12","cashier_number":3,"status":"waiting","last_update":"yesterday"}"#,
        ] {
            storage.set("queue_data_queue42", raw).unwrap();
            assert_eq!(store.load(&queue()), None, "{raw}");
            assert_eq!(storage.get("queue_data_queue42").unwrap(), None);
        }
    }

    #[test]
    fn test_terminal_records_are_never_retained() {
        let (store, storage, _) = fixture();

        storage
            .set(
                "queue_data_queue42",
                r#"{"otp":"AB12","cashier_number":3,"position":0,"status":"served"}"#,
            )
            .unwrap();
        assert_eq!(store.load(&queue()), None);
        assert_eq!(storage.get("queue_data_queue42").unwrap(), None);

        let mut removed = waiting_ticket();
        removed.status = TicketStatus::Removed;
        assert_eq!(store.save(&queue(), removed), None);
        assert_eq!(store.load(&queue()), None);
    }

    #[test]
    fn test_reconcile_merges_snapshot() {
        let (store, _, clock) = fixture();
        store.save(&queue(), waiting_ticket());
        clock.advance(chrono::Duration::seconds(30));

        let snapshot = Snapshot::new(0, TicketStatus::Serving, 0).with_cashier(3);
        let merged = store.reconcile(&queue(), &Otp::new("AB12"), &snapshot).unwrap();

        assert_eq!(merged.status, TicketStatus::Serving);
        assert_eq!(merged.position, 0);
        assert_eq!(merged.last_update, Some(clock.now()));
        assert_eq!(store.load(&queue()), Some(merged));
    }

    #[test]
    fn test_reconcile_seeds_missing_record() {
        let (store, _, _) = fixture();

        let snapshot = Snapshot::new(2, TicketStatus::Waiting, 120).with_cashier(1);
        let seeded = store.reconcile(&queue(), &Otp::new("ZZ99"), &snapshot).unwrap();

        assert_eq!(seeded.otp, Otp::new("ZZ99"));
        assert_eq!(seeded.cashier_number, Some(1));
        assert!(store.load(&queue()).is_some());
    }

    #[test]
    fn test_reconcile_terminal_evicts() {
        let (store, _, _) = fixture();
        store.save(&queue(), waiting_ticket());

        let snapshot = Snapshot::new(0, TicketStatus::Served, 0);
        assert_eq!(store.reconcile(&queue(), &Otp::new("AB12"), &snapshot), None);
        assert_eq!(store.load(&queue()), None);
    }

    #[test]
    fn test_clear_all_keeps_preferences() {
        let (store, storage, _) = fixture();
        store.save(&queue(), waiting_ticket());
        store.save(&QueueId::new("other"), waiting_ticket());
        storage.set("theme", "light").unwrap();
        storage.set("soundEnabled", "false").unwrap();

        assert_eq!(store.clear_all(), 2);

        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["soundEnabled".to_string(), "theme".to_string()]);
    }
}
