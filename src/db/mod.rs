//! Database layer
//!
//! SQLite (default, single file) or MySQL, selected by configuration.
//! Repositories work against the `DatabasePool` trait and never see the
//! concrete backend.
//!
//! ```ignore
//! use fanpress::config::DatabaseConfig;
//! use fanpress::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
