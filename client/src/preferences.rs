//! Sound and theme preferences.

use crate::storage::Storage;
use std::fmt;
use std::sync::Arc;

const SOUND_KEY: &str = "soundEnabled";
const THEME_KEY: &str = "theme";

/// Color theme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Theme {
    /// Dark background
    #[default]
    Dark,
    /// Light background
    Light,
}

impl Theme {
    /// The other theme
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    /// Stored name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preference flags stored next to the ticket cache
#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn Storage>,
}

impl Preferences {
    /// Preferences backed by `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Sound is on unless explicitly stored as `false`
    #[must_use]
    pub fn sound_enabled(&self) -> bool {
        self.get(SOUND_KEY).as_deref() != Some("false")
    }

    /// Persist the sound flag
    pub fn set_sound_enabled(&self, enabled: bool) {
        self.set(SOUND_KEY, if enabled { "true" } else { "false" });
    }

    /// Stored theme, dark when unset or unrecognized
    #[must_use]
    pub fn theme(&self) -> Theme {
        match self.get(THEME_KEY).as_deref() {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }

    /// Persist the theme
    pub fn set_theme(&self, theme: Theme) {
        self.set(THEME_KEY, theme.as_str());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap_or_else(|error| {
            tracing::warn!(key, error = %error, "Failed to read preference");
            None
        })
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(error) = self.storage.set(key, value) {
            tracing::warn!(key, error = %error, "Failed to save preference");
        }
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_defaults() {
        let prefs = Preferences::new(Arc::new(MemoryStorage::new()));
        assert!(prefs.sound_enabled());
        assert_eq!(prefs.theme(), Theme::Dark);
    }

    #[test]
    fn test_values_persist() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let prefs = Preferences::new(Arc::clone(&storage));

        prefs.set_sound_enabled(false);
        prefs.set_theme(Theme::Dark.toggled());

        let reopened = Preferences::new(storage);
        assert!(!reopened.sound_enabled());
        assert_eq!(reopened.theme(), Theme::Light);
    }
}
