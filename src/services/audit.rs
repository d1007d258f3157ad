//! Audit logger
//!
//! Every successful moderation or account action leaves one
//! [`AdminLogEntry`]. Entries ride on the caller's [`WriteTx`], so a
//! rolled-back action never leaves a log line behind. Failed attempts are
//! not logged.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::db::repositories::{tx, AdminLogRepository, WriteTx};
use crate::db::DynDatabasePool;
use crate::models::{AdminLogEntry, AdminLogFilter, ListParams, PagedResult};

/// Append `entry` inside an open transaction
pub async fn record(tx: &mut dyn WriteTx, entry: AdminLogEntry) -> Result<AdminLogEntry> {
    tx.append_log(&entry).await?;
    tracing::debug!(
        action = %entry.action,
        resource_type = %entry.resource_type,
        resource_id = entry.resource_id.as_deref().unwrap_or("-"),
        operator = entry.operator_id,
        "Audit entry recorded"
    );
    Ok(entry)
}

/// Read side and maintenance for the audit trail
pub struct AuditLogger {
    pool: DynDatabasePool,
    repo: Arc<dyn AdminLogRepository>,
}

impl AuditLogger {
    pub fn new(pool: DynDatabasePool, repo: Arc<dyn AdminLogRepository>) -> Self {
        Self { pool, repo }
    }

    /// Record an action that has no mutation of its own (login, logout)
    pub async fn record_standalone(&self, entry: AdminLogEntry) -> Result<AdminLogEntry> {
        let mut tx = tx::begin(&self.pool).await?;
        let entry = record(tx.as_mut(), entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn list(&self, filter: &AdminLogFilter, params: &ListParams) -> Result<PagedResult<AdminLogEntry>> {
        let total = self.repo.count(filter).await?;
        let items = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Drop entries older than `days`; returns how many were removed
    pub async fn purge_older_than(&self, days: i64) -> Result<u64> {
        if days <= 0 {
            anyhow::bail!("Retention window must be at least one day, got {}", days);
        }
        let cutoff = Utc::now() - Duration::days(days);
        let purged = self
            .repo
            .delete_older_than(cutoff)
            .await
            .context("Failed to purge admin logs")?;
        tracing::info!("Purged {} admin log entries older than {} days", purged, days);
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxAdminLogRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Actor, LogAction, LogResourceType, Role};

    async fn setup() -> (DynDatabasePool, AuditLogger) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let logger = AuditLogger::new(pool.clone(), SqlxAdminLogRepository::boxed(pool.clone()));
        (pool, logger)
    }

    fn login_entry(actor: &Actor) -> AdminLogEntry {
        AdminLogEntry::new(actor, LogAction::Login, LogResourceType::System, None, "Logged in")
            .with_ip(Some("127.0.0.1".into()))
    }

    #[tokio::test]
    async fn test_record_standalone_commits() {
        let (_pool, logger) = setup().await;
        let admin = Actor::new(1, "mod", Role::Admin);

        let entry = logger.record_standalone(login_entry(&admin)).await.unwrap();

        let page = logger.list(&AdminLogFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, entry.id);
        assert_eq!(page.items[0].ip_address.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_record_discarded_with_rollback() {
        let (pool, logger) = setup().await;
        let admin = Actor::new(1, "mod", Role::Admin);

        let mut tx = tx::begin(&pool).await.unwrap();
        record(tx.as_mut(), login_entry(&admin)).await.unwrap();
        tx.rollback().await.unwrap();

        let page = logger.list(&AdminLogFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let (_pool, logger) = setup().await;
        let admin = Actor::new(1, "mod", Role::Admin);
        for _ in 0..5 {
            logger.record_standalone(login_entry(&admin)).await.unwrap();
        }

        let page = logger.list(&AdminLogFilter::default(), &ListParams::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_entries() {
        let (_pool, logger) = setup().await;
        let admin = Actor::new(1, "mod", Role::Admin);
        let mut old = login_entry(&admin);
        old.created_at = Utc::now() - Duration::days(200);
        logger.record_standalone(old).await.unwrap();
        logger.record_standalone(login_entry(&admin)).await.unwrap();

        assert_eq!(logger.purge_older_than(90).await.unwrap(), 1);
        assert!(logger.purge_older_than(0).await.is_err());

        let page = logger.list(&AdminLogFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
