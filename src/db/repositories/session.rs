//! Session repository
//!
//! Login sessions keyed by an opaque token. Revoking every session of a
//! user is also exposed to [`super::tx`] so a ban and its revocation
//! commit together.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete sessions that expired before now
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::create(&mut conn, session).await?;
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::create(&mut conn, session).await?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::get_by_id(&mut conn, id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::get_by_id(&mut conn, id).await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::delete(&mut conn, id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::delete(&mut conn, id).await
            }
        }
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::delete_by_user(&mut conn, user_id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::delete_by_user(&mut conn, user_id).await
            }
        }
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::delete_expired(&mut conn, now).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::delete_expired(&mut conn, now).await
            }
        }
    }
}

macro_rules! session_queries {
    ($module:ident, $conn:ty, $row:ty) => {
        pub(crate) mod $module {
            use super::*;

            fn session_from_row(row: &$row) -> Result<Session> {
                Ok(Session {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    expires_at: row.try_get("expires_at")?,
                    created_at: row.try_get("created_at")?,
                })
            }

            pub async fn create(conn: &mut $conn, session: &Session) -> Result<()> {
                sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
                    .bind(session.id.as_str())
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to create session")?;
                Ok(())
            }

            pub async fn get_by_id(conn: &mut $conn, id: &str) -> Result<Option<Session>> {
                let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await
                    .context("Failed to get session by ID")?;
                row.map(|r| session_from_row(&r)).transpose()
            }

            pub async fn delete(conn: &mut $conn, id: &str) -> Result<()> {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to delete session")?;
                Ok(())
            }

            pub async fn delete_by_user(conn: &mut $conn, user_id: i64) -> Result<u64> {
                let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to delete sessions by user")?;
                Ok(result.rows_affected())
            }

            pub async fn delete_expired(conn: &mut $conn, now: DateTime<Utc>) -> Result<u64> {
                let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                    .bind(now)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to delete expired sessions")?;
                Ok(result.rows_affected())
            }
        }
    };
}

session_queries!(sqlite, sqlx::SqliteConnection, sqlx::sqlite::SqliteRow);
session_queries!(mysql, sqlx::MySqlConnection, sqlx::mysql::MySqlRow);
