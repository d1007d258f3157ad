//! Database migrations
//!
//! Code-based migrations embedded in the binary, with SQL for both SQLite
//! and MySQL. Applied versions are tracked in the `_migrations` table.
//!
//! ```ignore
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Every content table carries the same moderation columns: `owner_id`,
//! `review_status`, `reviewer_id`, `review_notes`, `reviewed_at`,
//! `is_deleted`, `deleted_at`, `created_at`, `updated_at`. Publication is
//! derived from `review_status`; there is no published flag.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_articles",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT,
                author VARCHAR(100) NOT NULL,
                category_primary VARCHAR(100),
                category_secondary VARCHAR(100),
                tags TEXT NOT NULL DEFAULT '[]',
                cover_url VARCHAR(500),
                owner_id INTEGER,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id INTEGER,
                review_notes TEXT,
                reviewed_at TIMESTAMP,
                is_deleted BOOLEAN NOT NULL DEFAULT 0,
                deleted_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_review ON articles(review_status, is_deleted);
            CREATE INDEX IF NOT EXISTS idx_articles_owner ON articles(owner_id);
            CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id VARCHAR(36) PRIMARY KEY,
                slug VARCHAR(255) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                excerpt TEXT,
                author VARCHAR(100) NOT NULL,
                category_primary VARCHAR(100),
                category_secondary VARCHAR(100),
                tags TEXT NOT NULL,
                cover_url VARCHAR(500),
                owner_id BIGINT,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id BIGINT,
                review_notes TEXT,
                reviewed_at TIMESTAMP NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_articles_review ON articles(review_status, is_deleted);
            CREATE INDEX idx_articles_owner ON articles(owner_id);
            CREATE INDEX idx_articles_created_at ON articles(created_at);
        "#,
    },
    Migration {
        version: 4,
        name: "create_videos",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS videos (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                author VARCHAR(100) NOT NULL,
                category VARCHAR(100),
                bvid VARCHAR(32) NOT NULL,
                publish_date VARCHAR(32),
                cover VARCHAR(500),
                owner_id INTEGER,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id INTEGER,
                review_notes TEXT,
                reviewed_at TIMESTAMP,
                is_deleted BOOLEAN NOT NULL DEFAULT 0,
                deleted_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_videos_review ON videos(review_status, is_deleted);
            CREATE INDEX IF NOT EXISTS idx_videos_owner ON videos(owner_id);
            CREATE INDEX IF NOT EXISTS idx_videos_created_at ON videos(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS videos (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                author VARCHAR(100) NOT NULL,
                category VARCHAR(100),
                bvid VARCHAR(32) NOT NULL,
                publish_date VARCHAR(32),
                cover VARCHAR(500),
                owner_id BIGINT,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id BIGINT,
                review_notes TEXT,
                reviewed_at TIMESTAMP NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_videos_review ON videos(review_status, is_deleted);
            CREATE INDEX idx_videos_owner ON videos(owner_id);
            CREATE INDEX idx_videos_created_at ON videos(created_at);
        "#,
    },
    Migration {
        version: 5,
        name: "create_photo_groups",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS photo_groups (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                category VARCHAR(100),
                date VARCHAR(32),
                description TEXT,
                cover_image_url VARCHAR(500),
                cover_thumb_url VARCHAR(500),
                owner_id INTEGER,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id INTEGER,
                review_notes TEXT,
                reviewed_at TIMESTAMP,
                is_deleted BOOLEAN NOT NULL DEFAULT 0,
                deleted_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_photo_groups_review ON photo_groups(review_status, is_deleted);
            CREATE INDEX IF NOT EXISTS idx_photo_groups_owner ON photo_groups(owner_id);
            CREATE INDEX IF NOT EXISTS idx_photo_groups_created_at ON photo_groups(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS photo_groups (
                id VARCHAR(36) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                category VARCHAR(100),
                date VARCHAR(32),
                description TEXT,
                cover_image_url VARCHAR(500),
                cover_thumb_url VARCHAR(500),
                owner_id BIGINT,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id BIGINT,
                review_notes TEXT,
                reviewed_at TIMESTAMP NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_photo_groups_review ON photo_groups(review_status, is_deleted);
            CREATE INDEX idx_photo_groups_owner ON photo_groups(owner_id);
            CREATE INDEX idx_photo_groups_created_at ON photo_groups(created_at);
        "#,
    },
    Migration {
        version: 6,
        name: "create_schedules",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category VARCHAR(100) NOT NULL,
                date VARCHAR(10) NOT NULL,
                city VARCHAR(100),
                venue VARCHAR(255),
                theme VARCHAR(255) NOT NULL,
                description TEXT,
                image VARCHAR(500),
                image_thumb VARCHAR(500),
                pending_poster VARCHAR(500),
                owner_id INTEGER,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id INTEGER,
                review_notes TEXT,
                reviewed_at TIMESTAMP,
                is_deleted BOOLEAN NOT NULL DEFAULT 0,
                deleted_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_schedules_review ON schedules(review_status, is_deleted);
            CREATE INDEX IF NOT EXISTS idx_schedules_owner ON schedules(owner_id);
            CREATE INDEX IF NOT EXISTS idx_schedules_date ON schedules(date);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS schedules (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                category VARCHAR(100) NOT NULL,
                date VARCHAR(10) NOT NULL,
                city VARCHAR(100),
                venue VARCHAR(255),
                theme VARCHAR(255) NOT NULL,
                description TEXT,
                image VARCHAR(500),
                image_thumb VARCHAR(500),
                pending_poster VARCHAR(500),
                owner_id BIGINT,
                review_status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reviewer_id BIGINT,
                review_notes TEXT,
                reviewed_at TIMESTAMP NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                deleted_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_schedules_review ON schedules(review_status, is_deleted);
            CREATE INDEX idx_schedules_owner ON schedules(owner_id);
            CREATE INDEX idx_schedules_date ON schedules(date);
        "#,
    },
    // Operator columns are copied rather than referenced so entries outlive
    // the accounts that wrote them.
    Migration {
        version: 7,
        name: "create_admin_logs",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS admin_logs (
                id VARCHAR(36) PRIMARY KEY,
                action VARCHAR(32) NOT NULL,
                resource_type VARCHAR(32) NOT NULL,
                resource_id VARCHAR(64),
                operator_id INTEGER NOT NULL,
                operator_username VARCHAR(50) NOT NULL,
                operator_role VARCHAR(20) NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                ip_address VARCHAR(45),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_admin_logs_created_at ON admin_logs(created_at);
            CREATE INDEX IF NOT EXISTS idx_admin_logs_operator ON admin_logs(operator_id);
            CREATE INDEX IF NOT EXISTS idx_admin_logs_action ON admin_logs(action);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS admin_logs (
                id VARCHAR(36) PRIMARY KEY,
                action VARCHAR(32) NOT NULL,
                resource_type VARCHAR(32) NOT NULL,
                resource_id VARCHAR(64),
                operator_id BIGINT NOT NULL,
                operator_username VARCHAR(50) NOT NULL,
                operator_role VARCHAR(20) NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                ip_address VARCHAR(45),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_admin_logs_created_at ON admin_logs(created_at);
            CREATE INDEX idx_admin_logs_operator ON admin_logs(operator_id);
            CREATE INDEX idx_admin_logs_action ON admin_logs(action);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

// MySQL commits DDL implicitly, so statements run one by one on the pool.
async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}
