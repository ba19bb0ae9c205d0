//! Analytics recompute
//!
//! Rebuilds every daily rollup row and agent counter from the raw
//! conversation, message and lead records. Ctrl-C stops the pass after the
//! current bucket; running the command again resumes from there.
//!
//! Usage:
//!   DATABASE_URL=./.db/botdesk.db cargo run --bin recompute
//!
//! Environment variables:
//!   DATABASE_URL          - SQLite database path (default: ./.db/botdesk.db)
//!   BOTDESK_DB_POOL_SIZE  - Connection pool size (default: 8)

use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use botdesk_backend::models::RecomputeOutcome;
use botdesk_backend::{BotDesk, Config, Database};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    log::info!("Opening database at {}", config.database_url);
    let db = Database::new(&config.database_url, config.db_pool_size)?;
    let desk = Arc::new(BotDesk::new(Arc::new(db)));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current bucket");
            on_signal.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || desk.recompute_analytics(&cancel)).await??;

    println!(
        "{} (resumed: {}): {} agents, {} buckets written, {} removed",
        match report.outcome {
            RecomputeOutcome::Completed => "Completed",
            RecomputeOutcome::Interrupted => "Interrupted",
        },
        report.resumed,
        report.agents_completed,
        report.buckets_written,
        report.buckets_removed
    );
    Ok(())
}
