mod config;
mod sweep;

use std::sync::Arc;

use tracing::info;

use tally_db::Database;
use tally_votes::VoteService;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tally_db=debug,tally_votes=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let svc = Arc::new(VoteService::new(db));

    info!(
        "Tally maintenance started (db: {}, interval: {}s, cleanup: {:?}{})",
        config.db_path.display(),
        config.reconcile_interval_secs,
        config.cleanup_days_old,
        if config.cleanup_dry_run { " dry run" } else { "" }
    );

    sweep::run_maintenance_loop(svc, config).await;

    Ok(())
}
