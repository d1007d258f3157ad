//! Batch job: drop audit entries older than the retention window.
//!
//! Usage: `purge-admin-logs [--config config.yml] [--days 90]`
//!
//! Without `--days` the window comes from `audit.retention_days`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanpress::config::Config;
use fanpress::db::{self, repositories::SqlxAdminLogRepository};
use fanpress::services::AuditLogger;

#[derive(Debug, Parser)]
#[command(name = "purge-admin-logs", about = "Delete audit log entries past their retention window")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Retention window in days; overrides `audit.retention_days`
    #[arg(long)]
    days: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanpress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load_with_env(&args.config)?;
    let days = args.days.unwrap_or(config.audit.retention_days);

    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let audit = AuditLogger::new(pool.clone(), SqlxAdminLogRepository::boxed(pool));
    let purged = audit.purge_older_than(days).await?;

    tracing::info!("Purged {} admin log entries older than {} days", purged, days);
    Ok(())
}
