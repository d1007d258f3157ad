//! Admin log repository
//!
//! Read side of the audit trail plus the retention purge. Entries are
//! appended only through a write transaction (see [`super::tx`]).

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AdminLogEntry, AdminLogFilter, LogAction, LogResourceType, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait AdminLogRepository: Send + Sync {
    /// Newest first
    async fn list(&self, filter: &AdminLogFilter, offset: i64, limit: i64) -> Result<Vec<AdminLogEntry>>;

    async fn count(&self, filter: &AdminLogFilter) -> Result<i64>;

    /// Remove entries created before `cutoff`, returning how many went
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxAdminLogRepository {
    pool: DynDatabasePool,
}

impl SqlxAdminLogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AdminLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AdminLogRepository for SqlxAdminLogRepository {
    async fn list(&self, filter: &AdminLogFilter, offset: i64, limit: i64) -> Result<Vec<AdminLogEntry>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::list(&mut conn, filter, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::list(&mut conn, filter, offset, limit).await
            }
        }
    }

    async fn count(&self, filter: &AdminLogFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::count(&mut conn, filter).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::count(&mut conn, filter).await
            }
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::delete_older_than(&mut conn, cutoff).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::delete_older_than(&mut conn, cutoff).await
            }
        }
    }
}

fn filter_clause(filter: &AdminLogFilter) -> String {
    let mut conditions = vec!["1 = 1"];
    if filter.action.is_some() {
        conditions.push("action = ?");
    }
    if filter.resource_type.is_some() {
        conditions.push("resource_type = ?");
    }
    if filter.operator_id.is_some() {
        conditions.push("operator_id = ?");
    }
    if filter.start.is_some() {
        conditions.push("created_at >= ?");
    }
    if filter.end.is_some() {
        conditions.push("created_at <= ?");
    }
    conditions.join(" AND ")
}

/// Bind the values matching the placeholders of [`filter_clause`]
macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {{
        let mut query = $query;
        if let Some(action) = $filter.action {
            query = query.bind(action.as_str());
        }
        if let Some(resource_type) = $filter.resource_type {
            query = query.bind(resource_type.as_str());
        }
        if let Some(operator_id) = $filter.operator_id {
            query = query.bind(operator_id);
        }
        if let Some(start) = $filter.start {
            query = query.bind(start);
        }
        if let Some(end) = $filter.end {
            query = query.bind(end);
        }
        query
    }};
}

macro_rules! admin_log_queries {
    ($module:ident, $conn:ty, $row:ty) => {
        pub(crate) mod $module {
            use super::*;

            fn entry_from_row(row: &$row) -> Result<AdminLogEntry> {
                let action: String = row.try_get("action")?;
                let resource_type: String = row.try_get("resource_type")?;
                let role: String = row.try_get("operator_role")?;
                let details: Option<String> = row.try_get("details")?;
                Ok(AdminLogEntry {
                    id: row.try_get("id")?,
                    action: LogAction::from_str(&action)?,
                    resource_type: LogResourceType::from_str(&resource_type)?,
                    resource_id: row.try_get("resource_id")?,
                    operator_id: row.try_get("operator_id")?,
                    operator_username: row.try_get("operator_username")?,
                    operator_role: Role::parse_stored(&role),
                    description: row.try_get("description")?,
                    details: details.and_then(|raw| serde_json::from_str(&raw).ok()),
                    ip_address: row.try_get("ip_address")?,
                    created_at: row.try_get("created_at")?,
                })
            }

            pub async fn append(conn: &mut $conn, entry: &AdminLogEntry) -> Result<()> {
                let details = entry
                    .details
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .context("Failed to encode log details")?;
                sqlx::query(
                    r#"
                    INSERT INTO admin_logs (id, action, resource_type, resource_id, operator_id,
                        operator_username, operator_role, description, details, ip_address, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(entry.id.as_str())
                .bind(entry.action.as_str())
                .bind(entry.resource_type.as_str())
                .bind(entry.resource_id.as_deref())
                .bind(entry.operator_id)
                .bind(entry.operator_username.as_str())
                .bind(entry.operator_role.as_str())
                .bind(entry.description.as_str())
                .bind(details)
                .bind(entry.ip_address.as_deref())
                .bind(entry.created_at)
                .execute(&mut *conn)
                .await
                .context("Failed to append admin log")?;
                Ok(())
            }

            pub async fn list(
                conn: &mut $conn,
                filter: &AdminLogFilter,
                offset: i64,
                limit: i64,
            ) -> Result<Vec<AdminLogEntry>> {
                let sql = format!(
                    "SELECT * FROM admin_logs WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    filter_clause(filter)
                );
                let rows = bind_filter!(sqlx::query(&sql), filter)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await
                    .context("Failed to list admin logs")?;
                rows.iter().map(entry_from_row).collect()
            }

            pub async fn count(conn: &mut $conn, filter: &AdminLogFilter) -> Result<i64> {
                let sql = format!("SELECT COUNT(*) AS n FROM admin_logs WHERE {}", filter_clause(filter));
                let row = bind_filter!(sqlx::query(&sql), filter)
                    .fetch_one(&mut *conn)
                    .await
                    .context("Failed to count admin logs")?;
                Ok(row.try_get("n")?)
            }

            pub async fn delete_older_than(conn: &mut $conn, cutoff: DateTime<Utc>) -> Result<u64> {
                let result = sqlx::query("DELETE FROM admin_logs WHERE created_at < ?")
                    .bind(cutoff)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to purge admin logs")?;
                Ok(result.rows_affected())
            }
        }
    };
}

admin_log_queries!(sqlite, sqlx::SqliteConnection, sqlx::sqlite::SqliteRow);
admin_log_queries!(mysql, sqlx::MySqlConnection, sqlx::mysql::MySqlRow);
