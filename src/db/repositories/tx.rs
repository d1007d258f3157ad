//! Write transactions
//!
//! Every audited mutation runs inside one [`WriteTx`]: the content or user
//! change and its admin log entry commit together or not at all. Dropping
//! an uncommitted transaction rolls it back.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AdminLogEntry, Content, ContentId, ContentKind, Role, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Sqlite, Transaction};

use super::{admin_log, content, session, user};

/// One relational transaction
#[async_trait]
pub trait WriteTx: Send {
    /// Live item by kind and id, read inside the transaction
    async fn find(&mut self, kind: ContentKind, id: &ContentId) -> Result<Option<Content>>;

    /// Insert new content; returns it with any database-assigned id
    async fn insert(&mut self, content: &Content) -> Result<Content>;

    async fn update(&mut self, content: &Content) -> Result<()>;

    /// Tombstone a live item; false when nothing matched
    async fn soft_delete(&mut self, kind: ContentKind, id: &ContentId, at: DateTime<Utc>) -> Result<bool>;

    async fn slug_exists(&mut self, slug: &str) -> Result<bool>;

    /// Set a user's role and status; false when the user does not exist
    async fn update_user_access(&mut self, user_id: i64, role: Role, status: UserStatus) -> Result<bool>;

    /// Revoke every session of a user
    async fn delete_user_sessions(&mut self, user_id: i64) -> Result<u64>;

    async fn append_log(&mut self, entry: &AdminLogEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Begin a transaction on whichever backend `pool` uses
pub async fn begin(pool: &DynDatabasePool) -> Result<Box<dyn WriteTx>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            let tx = pool.sqlite()?.begin().await.context("Failed to begin transaction")?;
            Ok(Box::new(SqliteWriteTx { tx }))
        }
        DatabaseDriver::Mysql => {
            let tx = pool.mysql()?.begin().await.context("Failed to begin transaction")?;
            Ok(Box::new(MysqlWriteTx { tx }))
        }
    }
}

pub struct SqliteWriteTx {
    tx: Transaction<'static, Sqlite>,
}

pub struct MysqlWriteTx {
    tx: Transaction<'static, MySql>,
}

macro_rules! impl_write_tx {
    ($ty:ident, $module:ident) => {
        #[async_trait]
        impl WriteTx for $ty {
            async fn find(&mut self, kind: ContentKind, id: &ContentId) -> Result<Option<Content>> {
                content::$module::find(&mut self.tx, kind, id).await
            }

            async fn insert(&mut self, item: &Content) -> Result<Content> {
                content::$module::insert(&mut self.tx, item).await
            }

            async fn update(&mut self, item: &Content) -> Result<()> {
                content::$module::update(&mut self.tx, item).await
            }

            async fn soft_delete(&mut self, kind: ContentKind, id: &ContentId, at: DateTime<Utc>) -> Result<bool> {
                content::$module::soft_delete(&mut self.tx, kind, id, at).await
            }

            async fn slug_exists(&mut self, slug: &str) -> Result<bool> {
                content::$module::slug_exists(&mut self.tx, slug).await
            }

            async fn update_user_access(&mut self, user_id: i64, role: Role, status: UserStatus) -> Result<bool> {
                user::$module::update_access(&mut self.tx, user_id, role, status, Utc::now()).await
            }

            async fn delete_user_sessions(&mut self, user_id: i64) -> Result<u64> {
                session::$module::delete_by_user(&mut self.tx, user_id).await
            }

            async fn append_log(&mut self, entry: &AdminLogEntry) -> Result<()> {
                admin_log::$module::append(&mut self.tx, entry).await
            }

            async fn commit(self: Box<Self>) -> Result<()> {
                self.tx.commit().await.context("Failed to commit transaction")
            }

            async fn rollback(self: Box<Self>) -> Result<()> {
                self.tx.rollback().await.context("Failed to roll back transaction")
            }
        }
    };
}

impl_write_tx!(SqliteWriteTx, sqlite);
impl_write_tx!(MysqlWriteTx, mysql);
