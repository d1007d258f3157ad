//! Content repository
//!
//! Storage for the four reviewable kinds. This module provides:
//! - `ContentRepository` for reads, filtered listings and statistics
//! - per-driver query modules shared with [`super::tx`], so reads on the
//!   pool and writes inside a transaction run the same SQL
//!
//! Soft-deleted rows are invisible to every read.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Article, Content, ContentFilter, ContentId, ContentKind, ContentMeta, PhotoGroup,
    ReviewFields, ReviewStatus, Schedule, Video,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

use super::tx::{self, WriteTx};

/// Content repository trait
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Live (non-deleted) item by kind and id
    async fn get(&self, kind: ContentKind, id: &ContentId) -> Result<Option<Content>>;

    /// Newest first across the kinds the filter reaches
    async fn list(&self, filter: &ContentFilter, offset: i64, limit: i64) -> Result<Vec<Content>>;

    async fn count(&self, filter: &ContentFilter) -> Result<i64>;

    /// `(kind, status, count)` over live content
    async fn status_counts(&self) -> Result<Vec<(ContentKind, ReviewStatus, i64)>>;

    /// Open a write transaction
    async fn begin(&self) -> Result<Box<dyn WriteTx>>;
}

/// SQLx-based content repository implementation
pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn get(&self, kind: ContentKind, id: &ContentId) -> Result<Option<Content>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                sqlite::find(&mut conn, kind, id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                mysql::find(&mut conn, kind, id).await
            }
        }
    }

    async fn list(&self, filter: &ContentFilter, offset: i64, limit: i64) -> Result<Vec<Content>> {
        let offset = offset.max(0);
        let limit = limit.max(0);
        let window = offset + limit;

        let mut merged = Vec::new();
        for kind in filter.kinds() {
            let rows = match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    let mut conn = self.pool.sqlite()?.acquire().await?;
                    sqlite::list(&mut conn, kind, filter, 0, window).await?
                }
                DatabaseDriver::Mysql => {
                    let mut conn = self.pool.mysql()?.acquire().await?;
                    mysql::list(&mut conn, kind, filter, 0, window).await?
                }
            };
            merged.extend(rows);
        }

        if filter.kind.is_some() {
            return Ok(merged.into_iter().skip(offset as usize).collect());
        }
        merged.sort_by(|a, b| b.meta().created_at.cmp(&a.meta().created_at));
        Ok(merged
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, filter: &ContentFilter) -> Result<i64> {
        let mut total = 0;
        for kind in filter.kinds() {
            total += match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    let mut conn = self.pool.sqlite()?.acquire().await?;
                    sqlite::count(&mut conn, kind, filter).await?
                }
                DatabaseDriver::Mysql => {
                    let mut conn = self.pool.mysql()?.acquire().await?;
                    mysql::count(&mut conn, kind, filter).await?
                }
            };
        }
        Ok(total)
    }

    async fn status_counts(&self) -> Result<Vec<(ContentKind, ReviewStatus, i64)>> {
        let mut counts = Vec::new();
        for kind in ContentKind::ALL {
            let rows = match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    let mut conn = self.pool.sqlite()?.acquire().await?;
                    sqlite::status_counts(&mut conn, kind).await?
                }
                DatabaseDriver::Mysql => {
                    let mut conn = self.pool.mysql()?.acquire().await?;
                    mysql::status_counts(&mut conn, kind).await?
                }
            };
            counts.extend(rows.into_iter().map(|(status, n)| (kind, status, n)));
        }
        Ok(counts)
    }

    async fn begin(&self) -> Result<Box<dyn WriteTx>> {
        tx::begin(&self.pool).await
    }
}

/// Bind a [`ContentId`] as the right column type
fn id_text(id: &ContentId) -> Option<&str> {
    match id {
        ContentId::Text(s) => Some(s),
        ContentId::Int(_) => None,
    }
}

fn id_int(id: &ContentId) -> Option<i64> {
    match id {
        ContentId::Int(n) => Some(*n),
        ContentId::Text(_) => None,
    }
}

fn filter_clause(filter: &ContentFilter) -> String {
    let mut clause = String::from("is_deleted = 0");
    if filter.status.is_some() {
        clause.push_str(" AND review_status = ?");
    }
    if filter.owner_id.is_some() {
        clause.push_str(" AND owner_id = ?");
    }
    clause
}

fn tags_to_json(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode article tags")
}

fn tags_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Discarding unreadable article tags {:?}: {}", raw, e);
        Vec::new()
    })
}

/// Generates the content queries for one driver. Arguments: module name,
/// connection type, row type, and how to read the inserted row id from a
/// query result.
macro_rules! content_queries {
    ($module:ident, $conn:ty, $row:ty, |$res:ident| $last_id:expr) => {
        pub(crate) mod $module {
            use super::*;

            fn meta_from_row(row: &$row) -> Result<ContentMeta> {
                let status: String = row.try_get("review_status")?;
                Ok(ContentMeta {
                    owner_id: row.try_get("owner_id")?,
                    review_status: ReviewStatus::from_str(&status)?,
                    review: ReviewFields {
                        reviewer_id: row.try_get("reviewer_id")?,
                        review_notes: row.try_get("review_notes")?,
                        reviewed_at: row.try_get("reviewed_at")?,
                    },
                    is_deleted: row.try_get("is_deleted")?,
                    deleted_at: row.try_get("deleted_at")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            }

            fn content_from_row(kind: ContentKind, row: &$row) -> Result<Content> {
                let meta = meta_from_row(row)?;
                Ok(match kind {
                    ContentKind::Article => {
                        let tags: String = row.try_get("tags")?;
                        Content::Article(Article {
                            id: row.try_get("id")?,
                            slug: row.try_get("slug")?,
                            title: row.try_get("title")?,
                            content: row.try_get("content")?,
                            excerpt: row.try_get("excerpt")?,
                            author: row.try_get("author")?,
                            category_primary: row.try_get("category_primary")?,
                            category_secondary: row.try_get("category_secondary")?,
                            tags: tags_from_json(&tags),
                            cover_url: row.try_get("cover_url")?,
                            meta,
                        })
                    }
                    ContentKind::Video => Content::Video(Video {
                        id: row.try_get("id")?,
                        title: row.try_get("title")?,
                        description: row.try_get("description")?,
                        author: row.try_get("author")?,
                        category: row.try_get("category")?,
                        bvid: row.try_get("bvid")?,
                        publish_date: row.try_get("publish_date")?,
                        cover: row.try_get("cover")?,
                        meta,
                    }),
                    ContentKind::Gallery => Content::Gallery(PhotoGroup {
                        id: row.try_get("id")?,
                        title: row.try_get("title")?,
                        category: row.try_get("category")?,
                        date: row.try_get("date")?,
                        description: row.try_get("description")?,
                        cover_image_url: row.try_get("cover_image_url")?,
                        cover_thumb_url: row.try_get("cover_thumb_url")?,
                        meta,
                    }),
                    ContentKind::Schedule => Content::Schedule(Schedule {
                        id: row.try_get("id")?,
                        category: row.try_get("category")?,
                        date: row.try_get("date")?,
                        city: row.try_get("city")?,
                        venue: row.try_get("venue")?,
                        theme: row.try_get("theme")?,
                        description: row.try_get("description")?,
                        image: row.try_get("image")?,
                        image_thumb: row.try_get("image_thumb")?,
                        pending_poster: row.try_get("pending_poster")?,
                        meta,
                    }),
                })
            }

            pub async fn find(conn: &mut $conn, kind: ContentKind, id: &ContentId) -> Result<Option<Content>> {
                let sql = format!("SELECT * FROM {} WHERE id = ? AND is_deleted = 0", kind.table());
                let query = sqlx::query(&sql);
                let query = match kind {
                    ContentKind::Schedule => match id_int(id) {
                        Some(n) => query.bind(n),
                        None => return Ok(None),
                    },
                    _ => match id_text(id) {
                        Some(s) => query.bind(s),
                        None => return Ok(None),
                    },
                };
                let row = query
                    .fetch_optional(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to load {} {}", kind, id))?;
                row.map(|r| content_from_row(kind, &r)).transpose()
            }

            pub async fn list(
                conn: &mut $conn,
                kind: ContentKind,
                filter: &ContentFilter,
                offset: i64,
                limit: i64,
            ) -> Result<Vec<Content>> {
                let sql = format!(
                    "SELECT * FROM {} WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    kind.table(),
                    filter_clause(filter)
                );
                let mut query = sqlx::query(&sql);
                if let Some(status) = filter.status {
                    query = query.bind(status.as_str());
                }
                if let Some(owner) = filter.owner_id {
                    query = query.bind(owner);
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to list {}", kind.table()))?;
                rows.iter().map(|r| content_from_row(kind, r)).collect()
            }

            pub async fn count(conn: &mut $conn, kind: ContentKind, filter: &ContentFilter) -> Result<i64> {
                let sql = format!("SELECT COUNT(*) AS n FROM {} WHERE {}", kind.table(), filter_clause(filter));
                let mut query = sqlx::query(&sql);
                if let Some(status) = filter.status {
                    query = query.bind(status.as_str());
                }
                if let Some(owner) = filter.owner_id {
                    query = query.bind(owner);
                }
                let row = query
                    .fetch_one(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to count {}", kind.table()))?;
                Ok(row.try_get("n")?)
            }

            pub async fn status_counts(conn: &mut $conn, kind: ContentKind) -> Result<Vec<(ReviewStatus, i64)>> {
                let sql = format!(
                    "SELECT review_status, COUNT(*) AS n FROM {} WHERE is_deleted = 0 GROUP BY review_status",
                    kind.table()
                );
                let rows = sqlx::query(&sql)
                    .fetch_all(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to count statuses of {}", kind.table()))?;
                rows.iter()
                    .map(|row| {
                        let status: String = row.try_get("review_status")?;
                        Ok((ReviewStatus::from_str(&status)?, row.try_get("n")?))
                    })
                    .collect()
            }

            pub async fn slug_exists(conn: &mut $conn, slug: &str) -> Result<bool> {
                let row = sqlx::query("SELECT COUNT(*) AS n FROM articles WHERE slug = ?")
                    .bind(slug)
                    .fetch_one(&mut *conn)
                    .await
                    .context("Failed to check article slug")?;
                let n: i64 = row.try_get("n")?;
                Ok(n > 0)
            }

            /// Insert a new row. Schedules get their id from the database.
            pub async fn insert(conn: &mut $conn, content: &Content) -> Result<Content> {
                let meta = content.meta();
                let mut stored = content.clone();
                match content {
                    Content::Article(a) => {
                        sqlx::query(
                            r#"
                            INSERT INTO articles (id, slug, title, content, excerpt, author, category_primary,
                                category_secondary, tags, cover_url, owner_id, review_status, reviewer_id,
                                review_notes, reviewed_at, is_deleted, deleted_at, created_at, updated_at)
                            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(a.id.as_str())
                        .bind(a.slug.as_str())
                        .bind(a.title.as_str())
                        .bind(a.content.as_str())
                        .bind(a.excerpt.as_deref())
                        .bind(a.author.as_str())
                        .bind(a.category_primary.as_deref())
                        .bind(a.category_secondary.as_deref())
                        .bind(tags_to_json(&a.tags)?)
                        .bind(a.cover_url.as_deref())
                        .bind(meta.owner_id)
                        .bind(meta.review_status.as_str())
                        .bind(meta.review.reviewer_id)
                        .bind(meta.review.review_notes.as_deref())
                        .bind(meta.review.reviewed_at)
                        .bind(meta.is_deleted)
                        .bind(meta.deleted_at)
                        .bind(meta.created_at)
                        .bind(meta.updated_at)
                        .execute(&mut *conn)
                        .await
                        .context("Failed to insert article")?;
                    }
                    Content::Video(v) => {
                        sqlx::query(
                            r#"
                            INSERT INTO videos (id, title, description, author, category, bvid, publish_date,
                                cover, owner_id, review_status, reviewer_id, review_notes, reviewed_at,
                                is_deleted, deleted_at, created_at, updated_at)
                            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(v.id.as_str())
                        .bind(v.title.as_str())
                        .bind(v.description.as_deref())
                        .bind(v.author.as_str())
                        .bind(v.category.as_deref())
                        .bind(v.bvid.as_str())
                        .bind(v.publish_date.as_deref())
                        .bind(v.cover.as_deref())
                        .bind(meta.owner_id)
                        .bind(meta.review_status.as_str())
                        .bind(meta.review.reviewer_id)
                        .bind(meta.review.review_notes.as_deref())
                        .bind(meta.review.reviewed_at)
                        .bind(meta.is_deleted)
                        .bind(meta.deleted_at)
                        .bind(meta.created_at)
                        .bind(meta.updated_at)
                        .execute(&mut *conn)
                        .await
                        .context("Failed to insert video")?;
                    }
                    Content::Gallery(g) => {
                        sqlx::query(
                            r#"
                            INSERT INTO photo_groups (id, title, category, date, description, cover_image_url,
                                cover_thumb_url, owner_id, review_status, reviewer_id, review_notes, reviewed_at,
                                is_deleted, deleted_at, created_at, updated_at)
                            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(g.id.as_str())
                        .bind(g.title.as_str())
                        .bind(g.category.as_deref())
                        .bind(g.date.as_deref())
                        .bind(g.description.as_deref())
                        .bind(g.cover_image_url.as_deref())
                        .bind(g.cover_thumb_url.as_deref())
                        .bind(meta.owner_id)
                        .bind(meta.review_status.as_str())
                        .bind(meta.review.reviewer_id)
                        .bind(meta.review.review_notes.as_deref())
                        .bind(meta.review.reviewed_at)
                        .bind(meta.is_deleted)
                        .bind(meta.deleted_at)
                        .bind(meta.created_at)
                        .bind(meta.updated_at)
                        .execute(&mut *conn)
                        .await
                        .context("Failed to insert photo group")?;
                    }
                    Content::Schedule(s) => {
                        let $res = sqlx::query(
                            r#"
                            INSERT INTO schedules (category, date, city, venue, theme, description, image,
                                image_thumb, pending_poster, owner_id, review_status, reviewer_id, review_notes,
                                reviewed_at, is_deleted, deleted_at, created_at, updated_at)
                            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(s.category.as_str())
                        .bind(s.date.as_str())
                        .bind(s.city.as_deref())
                        .bind(s.venue.as_deref())
                        .bind(s.theme.as_str())
                        .bind(s.description.as_deref())
                        .bind(s.image.as_deref())
                        .bind(s.image_thumb.as_deref())
                        .bind(s.pending_poster.as_deref())
                        .bind(meta.owner_id)
                        .bind(meta.review_status.as_str())
                        .bind(meta.review.reviewer_id)
                        .bind(meta.review.review_notes.as_deref())
                        .bind(meta.review.reviewed_at)
                        .bind(meta.is_deleted)
                        .bind(meta.deleted_at)
                        .bind(meta.created_at)
                        .bind(meta.updated_at)
                        .execute(&mut *conn)
                        .await
                        .context("Failed to insert schedule")?;
                        if let Content::Schedule(stored) = &mut stored {
                            stored.id = $last_id;
                        }
                    }
                }
                Ok(stored)
            }

            /// Write back editable and review columns. Ownership, creation
            /// time and tombstone state are never changed here.
            pub async fn update(conn: &mut $conn, content: &Content) -> Result<()> {
                let meta = content.meta();
                let result = match content {
                    Content::Article(a) => sqlx::query(
                        r#"
                        UPDATE articles SET slug = ?, title = ?, content = ?, excerpt = ?, category_primary = ?,
                            category_secondary = ?, tags = ?, cover_url = ?, review_status = ?, reviewer_id = ?,
                            review_notes = ?, reviewed_at = ?, updated_at = ?
                        WHERE id = ? AND is_deleted = 0
                        "#,
                    )
                    .bind(a.slug.as_str())
                    .bind(a.title.as_str())
                    .bind(a.content.as_str())
                    .bind(a.excerpt.as_deref())
                    .bind(a.category_primary.as_deref())
                    .bind(a.category_secondary.as_deref())
                    .bind(tags_to_json(&a.tags)?)
                    .bind(a.cover_url.as_deref())
                    .bind(meta.review_status.as_str())
                    .bind(meta.review.reviewer_id)
                    .bind(meta.review.review_notes.as_deref())
                    .bind(meta.review.reviewed_at)
                    .bind(meta.updated_at)
                    .bind(a.id.as_str())
                    .execute(&mut *conn)
                    .await,
                    Content::Video(v) => sqlx::query(
                        r#"
                        UPDATE videos SET title = ?, description = ?, category = ?, bvid = ?, publish_date = ?,
                            cover = ?, review_status = ?, reviewer_id = ?, review_notes = ?, reviewed_at = ?,
                            updated_at = ?
                        WHERE id = ? AND is_deleted = 0
                        "#,
                    )
                    .bind(v.title.as_str())
                    .bind(v.description.as_deref())
                    .bind(v.category.as_deref())
                    .bind(v.bvid.as_str())
                    .bind(v.publish_date.as_deref())
                    .bind(v.cover.as_deref())
                    .bind(meta.review_status.as_str())
                    .bind(meta.review.reviewer_id)
                    .bind(meta.review.review_notes.as_deref())
                    .bind(meta.review.reviewed_at)
                    .bind(meta.updated_at)
                    .bind(v.id.as_str())
                    .execute(&mut *conn)
                    .await,
                    Content::Gallery(g) => sqlx::query(
                        r#"
                        UPDATE photo_groups SET title = ?, category = ?, date = ?, description = ?,
                            cover_image_url = ?, cover_thumb_url = ?, review_status = ?, reviewer_id = ?,
                            review_notes = ?, reviewed_at = ?, updated_at = ?
                        WHERE id = ? AND is_deleted = 0
                        "#,
                    )
                    .bind(g.title.as_str())
                    .bind(g.category.as_deref())
                    .bind(g.date.as_deref())
                    .bind(g.description.as_deref())
                    .bind(g.cover_image_url.as_deref())
                    .bind(g.cover_thumb_url.as_deref())
                    .bind(meta.review_status.as_str())
                    .bind(meta.review.reviewer_id)
                    .bind(meta.review.review_notes.as_deref())
                    .bind(meta.review.reviewed_at)
                    .bind(meta.updated_at)
                    .bind(g.id.as_str())
                    .execute(&mut *conn)
                    .await,
                    Content::Schedule(s) => sqlx::query(
                        r#"
                        UPDATE schedules SET category = ?, date = ?, city = ?, venue = ?, theme = ?,
                            description = ?, image = ?, image_thumb = ?, pending_poster = ?, review_status = ?,
                            reviewer_id = ?, review_notes = ?, reviewed_at = ?, updated_at = ?
                        WHERE id = ? AND is_deleted = 0
                        "#,
                    )
                    .bind(s.category.as_str())
                    .bind(s.date.as_str())
                    .bind(s.city.as_deref())
                    .bind(s.venue.as_deref())
                    .bind(s.theme.as_str())
                    .bind(s.description.as_deref())
                    .bind(s.image.as_deref())
                    .bind(s.image_thumb.as_deref())
                    .bind(s.pending_poster.as_deref())
                    .bind(meta.review_status.as_str())
                    .bind(meta.review.reviewer_id)
                    .bind(meta.review.review_notes.as_deref())
                    .bind(meta.review.reviewed_at)
                    .bind(meta.updated_at)
                    .bind(s.id)
                    .execute(&mut *conn)
                    .await,
                }
                .with_context(|| format!("Failed to update {} {}", content.kind(), content.id()))?;

                if result.rows_affected() == 0 {
                    return Err(anyhow!("{} {} no longer exists", content.kind(), content.id()));
                }
                Ok(())
            }

            /// Tombstone a live row; false when nothing matched
            pub async fn soft_delete(
                conn: &mut $conn,
                kind: ContentKind,
                id: &ContentId,
                at: DateTime<Utc>,
            ) -> Result<bool> {
                let sql = format!(
                    "UPDATE {} SET is_deleted = 1, deleted_at = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
                    kind.table()
                );
                let query = sqlx::query(&sql).bind(at).bind(at);
                let query = match (kind, id) {
                    (ContentKind::Schedule, ContentId::Int(n)) => query.bind(*n),
                    (ContentKind::Schedule, ContentId::Text(_)) => return Ok(false),
                    (_, ContentId::Text(s)) => query.bind(s.as_str()),
                    (_, ContentId::Int(_)) => return Ok(false),
                };
                let result = query
                    .execute(&mut *conn)
                    .await
                    .with_context(|| format!("Failed to delete {} {}", kind, id))?;
                Ok(result.rows_affected() > 0)
            }
        }
    };
}

content_queries!(sqlite, sqlx::SqliteConnection, sqlx::sqlite::SqliteRow, |res| res.last_insert_rowid());
content_queries!(mysql, sqlx::MySqlConnection, sqlx::mysql::MySqlRow, |res| res.last_insert_id() as i64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Actor, ContentInput, Role, ScheduleInput, VideoInput};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxContentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxContentRepository::new(pool))
    }

    async fn create_test_user(pool: &DynDatabasePool, username: &str) -> Actor {
        let id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'h')")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        Actor::new(id, username, Role::User)
    }

    fn video(owner: &Actor, title: &str, status: ReviewStatus, created: DateTime<Utc>) -> Content {
        let input = ContentInput::Video(VideoInput {
            title: title.into(),
            description: None,
            category: Some("现场".into()),
            bvid: "BV1xx411c7mD".into(),
            publish_date: None,
            cover: None,
        });
        Content::from_input(input, owner, status, created)
    }

    fn schedule(owner: &Actor) -> Content {
        let input = ContentInput::Schedule(ScheduleInput {
            category: "演唱会".into(),
            date: "2025-06-01".into(),
            city: Some("北京".into()),
            venue: None,
            theme: "巡演".into(),
            description: None,
        });
        Content::from_input(input, owner, ReviewStatus::Pending, Utc::now())
    }

    async fn insert(repo: &SqlxContentRepository, content: &Content) -> Content {
        let mut tx = repo.begin().await.unwrap();
        let stored = tx.insert(content).await.unwrap();
        tx.commit().await.unwrap();
        stored
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        let content = video(&owner, "Encore", ReviewStatus::Draft, Utc::now());

        insert(&repo, &content).await;
        let loaded = repo.get(ContentKind::Video, &content.id()).await.unwrap().unwrap();

        assert_eq!(loaded.title(), "Encore");
        assert_eq!(loaded.owner_id(), Some(owner.id));
        assert_eq!(loaded.status(), ReviewStatus::Draft);
    }

    #[tokio::test]
    async fn test_schedule_gets_integer_id() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "staff").await;

        let first = insert(&repo, &schedule(&owner)).await;
        let second = insert(&repo, &schedule(&owner)).await;

        assert_eq!(first.id(), ContentId::Int(1));
        assert_eq!(second.id(), ContentId::Int(2));
        assert!(repo.get(ContentKind::Schedule, &ContentId::Int(2)).await.unwrap().is_some());
        assert!(repo
            .get(ContentKind::Schedule, &ContentId::Text("2".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_insert() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        let content = video(&owner, "Gone", ReviewStatus::Draft, Utc::now());

        let mut tx = repo.begin().await.unwrap();
        tx.insert(&content).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(repo.get(ContentKind::Video, &content.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_review_fields() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        let mut content = video(&owner, "Pending", ReviewStatus::Pending, Utc::now());
        insert(&repo, &content).await;

        let now = Utc::now();
        content.as_reviewable_mut().set_status(ReviewStatus::Rejected);
        content.as_reviewable_mut().set_reviewer_fields(ReviewFields {
            reviewer_id: Some(owner.id),
            review_notes: Some("too short".into()),
            reviewed_at: Some(now),
        });
        let mut tx = repo.begin().await.unwrap();
        tx.update(&content).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = repo.get(ContentKind::Video, &content.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), ReviewStatus::Rejected);
        assert_eq!(loaded.meta().review.review_notes.as_deref(), Some("too short"));
        assert!(loaded.meta().review.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_content() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        let content = video(&owner, "Bye", ReviewStatus::Approved, Utc::now());
        insert(&repo, &content).await;

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.soft_delete(ContentKind::Video, &content.id(), Utc::now()).await.unwrap());
        assert!(!tx.soft_delete(ContentKind::Video, &content.id(), Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        assert!(repo.get(ContentKind::Video, &content.id()).await.unwrap().is_none());
        assert_eq!(repo.count(&ContentFilter::default()).await.unwrap(), 0);

        let deleted: bool = sqlx::query_scalar("SELECT is_deleted FROM videos")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let base = Utc::now();

        insert(&repo, &video(&alice, "oldest", ReviewStatus::Pending, base - Duration::minutes(3))).await;
        insert(&repo, &video(&bob, "middle", ReviewStatus::Pending, base - Duration::minutes(2))).await;
        insert(&repo, &video(&alice, "draft", ReviewStatus::Draft, base - Duration::minutes(1))).await;

        let pending = ContentFilter {
            status: Some(ReviewStatus::Pending),
            ..Default::default()
        };
        let items = repo.list(&pending, 0, 10).await.unwrap();
        let titles: Vec<_> = items.iter().map(|c| c.title().to_string()).collect();
        assert_eq!(titles, vec!["middle", "oldest"]);
        assert_eq!(repo.count(&pending).await.unwrap(), 2);

        let mine = ContentFilter {
            owner_id: Some(alice.id),
            ..Default::default()
        };
        assert_eq!(repo.count(&mine).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_merges_kinds_with_pagination() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        let base = Utc::now();

        for i in 0..3 {
            insert(&repo, &video(&owner, &format!("v{}", i), ReviewStatus::Pending, base - Duration::minutes(i * 2))).await;
        }
        let mut sched = schedule(&owner);
        if let Content::Schedule(s) = &mut sched {
            s.meta.created_at = base - Duration::minutes(1);
        }
        insert(&repo, &sched).await;

        let filter = ContentFilter::default();
        let first = repo.list(&filter, 0, 2).await.unwrap();
        let second = repo.list(&filter, 2, 2).await.unwrap();

        assert_eq!(first.iter().map(|c| c.kind()).collect::<Vec<_>>(), vec![ContentKind::Video, ContentKind::Schedule]);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].title(), "v1");
        assert_eq!(repo.count(&filter).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "fan").await;
        insert(&repo, &video(&owner, "a", ReviewStatus::Pending, Utc::now())).await;
        insert(&repo, &video(&owner, "b", ReviewStatus::Pending, Utc::now())).await;
        insert(&repo, &schedule(&owner)).await;

        let mut counts = repo.status_counts().await.unwrap();
        counts.sort();
        assert_eq!(
            counts,
            vec![
                (ContentKind::Video, ReviewStatus::Pending, 2),
                (ContentKind::Schedule, ReviewStatus::Pending, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_article_tags_and_slug() {
        let (pool, repo) = setup_test_repo().await;
        let owner = create_test_user(&pool, "writer").await;
        let input = ContentInput::Article(crate::models::ArticleInput {
            title: "Tour diary".into(),
            content: "<p>day one</p>".into(),
            excerpt: None,
            category_primary: Some("峰迷荟萃".into()),
            category_secondary: None,
            tags: vec!["live".into(), "2025".into()],
            cover_url: None,
        });
        let mut article = Content::from_input(input, &owner, ReviewStatus::Draft, Utc::now());
        if let Content::Article(a) = &mut article {
            a.slug = "tour-diary".into();
        }

        let mut tx = repo.begin().await.unwrap();
        assert!(!tx.slug_exists("tour-diary").await.unwrap());
        tx.insert(&article).await.unwrap();
        assert!(tx.slug_exists("tour-diary").await.unwrap());
        tx.commit().await.unwrap();

        match repo.get(ContentKind::Article, &article.id()).await.unwrap().unwrap() {
            Content::Article(a) => assert_eq!(a.tags, vec!["live", "2025"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
