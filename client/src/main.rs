//! Terminal client for a walk-in queue.
//!
//! ```text
//! walkin join <queue_id>          join a queue, or show the ticket already held
//! walkin status <queue_id> <otp>  follow a ticket until ctrl-c
//! walkin status <queue_id> <otp> <status>
//!                                 follow a ticket last shown with <status>
//! walkin forget                   remove every cached ticket
//! ```
//!
//! While following a ticket, type `check`, `sound`, `theme`, `new`, or `quit`.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkin_client::{
    ClientConfig, ConsolePresenter, JoinPage, Otp, PageParts, PresentationAdapter, QueueId, StatusPage, TicketStatus,
    forget_all,
};

const USAGE: &str = "usage: walkin join <queue_id> | walkin status <queue_id> <otp> [status] | walkin forget";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "walkin=info,walkin_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, storage = %config.storage_path.display(), "Configuration loaded");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["join", queue_id] => join(&config, QueueId::new(*queue_id)).await?,
        ["status", queue_id, otp] => follow(&config, QueueId::new(*queue_id), Otp::new(*otp), None).await?,
        ["status", queue_id, otp, shown] => {
            let shown = TicketStatus::from(*shown);
            follow(&config, QueueId::new(*queue_id), Otp::new(*otp), Some(shown)).await?;
        },
        ["forget"] => {
            let removed = forget_all(&config)?;
            println!("Removed {removed} cached ticket(s).");
        },
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        },
    }

    Ok(())
}

async fn join(config: &ClientConfig, queue_id: QueueId) -> Result<(), Box<dyn std::error::Error>> {
    let presenter: Arc<dyn PresentationAdapter> = Arc::new(ConsolePresenter);
    let page = JoinPage::open(config, queue_id.clone(), presenter)?;

    if let Some(ticket) = page.rehydrate().await? {
        println!("Follow it with: walkin status {queue_id} {}", ticket.otp);
        page.close().await?;
        return Ok(());
    }

    let joined = page.join().await?;
    page.close().await?;

    match joined {
        Some(otp) => {
            println!("Joined {queue_id}. Your ticket is {otp}.");
            println!("Follow it with: walkin status {queue_id} {otp}");
        },
        None => std::process::exit(1),
    }
    Ok(())
}

async fn follow(
    config: &ClientConfig,
    queue_id: QueueId,
    otp: Otp,
    shown: Option<TicketStatus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let presenter: Arc<dyn PresentationAdapter> = Arc::new(ConsolePresenter);
    let mut page = match shown {
        Some(status) => {
            let parts = PageParts::production(config, presenter)?;
            StatusPage::shown_as(config.clone(), parts, queue_id.clone(), otp, status)
        },
        None => StatusPage::open(config, queue_id.clone(), otp, presenter)?,
    };
    page.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "check" => page.check_now().await?,
                    "sound" => page.toggle_sound().await?,
                    "theme" => page.toggle_theme().await?,
                    "new" => {
                        page.join_new_queue().await?;
                        println!("Join again with: walkin join {queue_id}");
                        break;
                    },
                    "quit" | "exit" => break,
                    "" => {},
                    other => warn!(command = other, "Unknown command"),
                }
            }
        }
    }

    page.stop().await?;
    Ok(())
}
