//! User repository
//!
//! - `UserRepository` trait defining the interface for account data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL
//!
//! Role and status changes go through [`super::tx`] instead, so they
//! commit together with their audit entry.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Role, User, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user, returning it with its assigned id
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn count(&self) -> Result<i64>;

    /// Users ordered by id
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::create(&mut conn, user).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::create(&mut conn, user).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::find_by(&mut conn, "id", Lookup::Id(id)).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::find_by(&mut conn, "id", Lookup::Id(id)).await
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::find_by(&mut conn, "username", Lookup::Text(username)).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::find_by(&mut conn, "username", Lookup::Text(username)).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::find_by(&mut conn, "email", Lookup::Text(email)).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::find_by(&mut conn, "email", Lookup::Text(email)).await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::count(&mut conn).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::count(&mut conn).await
            }
        }
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::list(&mut conn, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::list(&mut conn, offset, limit).await
            }
        }
    }
}

enum Lookup<'a> {
    Id(i64),
    Text(&'a str),
}

macro_rules! user_queries {
    ($module:ident, $conn:ty, $row:ty, |$res:ident| $last_id:expr) => {
        pub(crate) mod $module {
            use super::*;

            const COLUMNS: &str = "id, username, email, password_hash, role, status, created_at, updated_at";

            fn user_from_row(row: &$row) -> Result<User> {
                let role: String = row.try_get("role")?;
                let status: String = row.try_get("status")?;
                Ok(User {
                    id: row.try_get("id")?,
                    username: row.try_get("username")?,
                    email: row.try_get("email")?,
                    password_hash: row.try_get("password_hash")?,
                    role: Role::parse_stored(&role),
                    // Unreadable status locks the account out
                    status: UserStatus::from_str(&status).unwrap_or(UserStatus::Banned),
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            }

            pub async fn create(conn: &mut $conn, user: &User) -> Result<User> {
                let now = Utc::now();
                let $res = sqlx::query(
                    r#"
                    INSERT INTO users (username, email, password_hash, role, status, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(user.username.as_str())
                .bind(user.email.as_str())
                .bind(user.password_hash.as_str())
                .bind(user.role.as_str())
                .bind(user.status.to_string())
                .bind(now)
                .bind(now)
                .execute(&mut *conn)
                .await
                .context("Failed to create user")?;

                Ok(User {
                    id: $last_id,
                    created_at: now,
                    updated_at: now,
                    ..user.clone()
                })
            }

            pub(super) async fn find_by(
                conn: &mut $conn,
                column: &'static str,
                value: Lookup<'_>,
            ) -> Result<Option<User>> {
                let sql = format!("SELECT {} FROM users WHERE {} = ?", COLUMNS, column);
                let query = sqlx::query(&sql);
                let query = match value {
                    Lookup::Id(id) => query.bind(id),
                    Lookup::Text(s) => query.bind(s),
                };
                let row = query
                    .fetch_optional(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to get user by {}", column))?;
                row.map(|r| user_from_row(&r)).transpose()
            }

            pub async fn count(conn: &mut $conn) -> Result<i64> {
                let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
                    .fetch_one(&mut *conn)
                    .await
                    .context("Failed to count users")?;
                Ok(row.try_get("n")?)
            }

            pub async fn list(conn: &mut $conn, offset: i64, limit: i64) -> Result<Vec<User>> {
                let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", COLUMNS);
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(user_from_row).collect()
            }

            /// Set role and status; false when the user does not exist
            pub async fn update_access(
                conn: &mut $conn,
                user_id: i64,
                role: Role,
                status: UserStatus,
                at: DateTime<Utc>,
            ) -> Result<bool> {
                let result = sqlx::query("UPDATE users SET role = ?, status = ?, updated_at = ? WHERE id = ?")
                    .bind(role.as_str())
                    .bind(status.to_string())
                    .bind(at)
                    .bind(user_id)
                    .execute(&mut *conn)
                    .await
                    .context("Failed to update user access")?;
                Ok(result.rows_affected() > 0)
            }
        }
    };
}

user_queries!(sqlite, sqlx::SqliteConnection, sqlx::sqlite::SqliteRow, |res| res.last_insert_rowid());
user_queries!(mysql, sqlx::MySqlConnection, sqlx::mysql::MySqlRow, |res| res.last_insert_id() as i64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "hashed_password_123".to_string(),
            Role::User,
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.username, "testuser");
        assert_eq!(created.role, Role::User);
        assert_eq!(created.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&create_test_user("fan", "fan@example.com")).await.unwrap();

        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().username, "fan");
        assert_eq!(repo.get_by_username("fan").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_email("fan@example.com").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_username_constraint() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("dup", "a@example.com")).await.unwrap();
        assert!(repo.create(&create_test_user("dup", "b@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_stored_role_reads_as_guest() {
        let (pool, repo) = setup_test_repo().await;
        let created = repo.create(&create_test_user("odd", "odd@example.com")).await.unwrap();
        sqlx::query("UPDATE users SET role = 'moderator' WHERE id = ?")
            .bind(created.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Guest);
    }

    #[tokio::test]
    async fn test_update_access() {
        let (pool, repo) = setup_test_repo().await;
        let created = repo.create(&create_test_user("target", "t@example.com")).await.unwrap();

        let mut conn = pool.sqlite().unwrap().acquire().await.unwrap();
        assert!(sqlite::update_access(&mut conn, created.id, Role::Admin, UserStatus::Banned, Utc::now())
            .await
            .unwrap());
        assert!(!sqlite::update_access(&mut conn, 999, Role::Admin, UserStatus::Active, Utc::now())
            .await
            .unwrap());
        drop(conn);

        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Admin);
        assert!(loaded.is_banned());
    }

    #[tokio::test]
    async fn test_count_and_list() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..3 {
            repo.create(&create_test_user(&format!("u{}", i), &format!("u{}@example.com", i)))
                .await
                .unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 3);
        let page = repo.list(1, 5).await.unwrap();
        assert_eq!(page.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(), vec!["u1", "u2"]);
    }
}
