//! Content service
//!
//! Owner-facing side of the moderation lifecycle: create, edit, submit,
//! delete, deferred poster uploads and reads. Every mutation runs in one
//! write transaction together with its audit entry. Approval and
//! rejection live in [`super::review`].

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::db::repositories::ContentRepository;
use crate::models::{
    Actor, AdminLogEntry, Content, ContentFilter, ContentId, ContentInput, ContentKind, ListParams,
    LogAction, PagedResult, ReviewStatus, Role,
};
use crate::services::audit;
use crate::services::error::ModerationError;
use crate::services::lifecycle::{self, initial_status};
use crate::services::permissions::{has_permission, PermissionPolicy};
use crate::services::storage::DynObjectStorage;

pub struct ContentService {
    repo: Arc<dyn ContentRepository>,
    storage: DynObjectStorage,
    policy: PermissionPolicy,
    uploads: StorageConfig,
}

impl ContentService {
    pub fn new(
        repo: Arc<dyn ContentRepository>,
        storage: DynObjectStorage,
        policy: PermissionPolicy,
        uploads: StorageConfig,
    ) -> Self {
        Self {
            repo,
            storage,
            policy,
            uploads,
        }
    }

    /// Create content owned by `actor`.
    ///
    /// `requested` may ask for `pending` to skip the separate submit step;
    /// the default is `draft`.
    pub async fn create(
        &self,
        input: ContentInput,
        actor: &Actor,
        requested: Option<ReviewStatus>,
        ip: Option<String>,
    ) -> Result<Content, ModerationError> {
        let kind = input.kind();
        if !self.policy.can_create_content(kind, actor) {
            return Err(ModerationError::Forbidden);
        }
        input.validate().map_err(ModerationError::ValidationError)?;
        if let ContentInput::Article(article) = &input {
            if let Some(category) = &article.category_primary {
                if !self.policy.can_publish_category(actor, category) {
                    return Err(ModerationError::Forbidden);
                }
            }
        }
        let status = initial_status(requested)?;

        let mut content = Content::from_input(input, actor, status, Utc::now());
        let mut tx = self.repo.begin().await?;
        if let Content::Article(article) = &mut content {
            article.slug = unique_slug(tx.as_mut(), &article.title).await?;
        }
        let content = tx.insert(&content).await?;

        let entry = AdminLogEntry::new(
            actor,
            LogAction::Create,
            kind.into(),
            Some(content.id().to_string()),
            format!("Created {}: {}", kind, content.title()),
        )
        .with_details(json!({ "status": status }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(kind = %kind, id = %content.id(), operator = actor.id, "Created as {}", status);
        Ok(content)
    }

    /// Replace the editable fields of an item.
    ///
    /// Approved content stays approved unless the policy requeues edits by
    /// a non-staff owner.
    pub async fn update(
        &self,
        kind: ContentKind,
        id: &ContentId,
        input: ContentInput,
        actor: &Actor,
        ip: Option<String>,
    ) -> Result<Content, ModerationError> {
        if input.kind() != kind {
            return Err(ModerationError::ValidationError(format!(
                "Expected {} fields, got {}",
                kind,
                input.kind()
            )));
        }
        input.validate().map_err(ModerationError::ValidationError)?;

        let mut tx = self.repo.begin().await?;
        let mut content = tx
            .find(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;
        if !self.policy.can_edit_content(content.as_reviewable(), actor) {
            return Err(ModerationError::Forbidden);
        }
        if let (Content::Article(current), ContentInput::Article(next)) = (&content, &input) {
            if let Some(category) = &next.category_primary {
                if current.category_primary.as_ref() != Some(category)
                    && !self.policy.can_publish_category(actor, category)
                {
                    return Err(ModerationError::Forbidden);
                }
            }
        }

        let requeue = self.policy.requeues_on_edit(content.as_reviewable(), actor);
        let now = Utc::now();
        content
            .apply_input(input, now)
            .map_err(|got| ModerationError::ValidationError(format!("Expected {} fields, got {}", kind, got)))?;
        if requeue {
            content.as_reviewable_mut().set_status(ReviewStatus::Pending);
        }
        tx.update(&content).await?;

        let entry = AdminLogEntry::new(
            actor,
            LogAction::Update,
            kind.into(),
            Some(id.to_string()),
            format!("Updated {}: {}", kind, content.title()),
        )
        .with_details(json!({ "requeued": requeue }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(kind = %kind, id = %id, operator = actor.id, requeued = requeue, "Updated");
        Ok(content)
    }

    /// Owner sends draft or rejected content into the review queue
    pub async fn submit(
        &self,
        kind: ContentKind,
        id: &ContentId,
        actor: &Actor,
        ip: Option<String>,
    ) -> Result<Content, ModerationError> {
        let mut tx = self.repo.begin().await?;
        let mut content = tx
            .find(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;
        if !has_permission(actor.role, Role::User) || content.owner_id() != Some(actor.id) {
            return Err(ModerationError::Forbidden);
        }

        let previous = content.status();
        let next = lifecycle::submit(content.as_reviewable_mut(), Utc::now())?;
        tx.update(&content).await?;

        let entry = AdminLogEntry::new(
            actor,
            LogAction::Update,
            kind.into(),
            Some(id.to_string()),
            format!("Submitted {} for review: {}", kind, content.title()),
        )
        .with_details(json!({ "from": previous, "to": next }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(kind = %kind, id = %id, operator = actor.id, "Submitted for review");
        Ok(content)
    }

    /// Soft delete, the same for every kind
    pub async fn delete(
        &self,
        kind: ContentKind,
        id: &ContentId,
        actor: &Actor,
        ip: Option<String>,
    ) -> Result<(), ModerationError> {
        let mut tx = self.repo.begin().await?;
        let content = tx
            .find(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;
        if !self.policy.can_delete_content(content.as_reviewable(), actor) {
            return Err(ModerationError::Forbidden);
        }
        if !tx.soft_delete(kind, id, Utc::now()).await? {
            return Err(ModerationError::not_found(kind, id));
        }

        let entry = AdminLogEntry::new(
            actor,
            LogAction::Delete,
            kind.into(),
            Some(id.to_string()),
            format!("Deleted {}: {}", kind, content.title()),
        )
        .with_details(json!({ "status": content.status() }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(kind = %kind, id = %id, operator = actor.id, "Deleted");
        Ok(())
    }

    /// Park a poster for a schedule in temp storage until it is approved
    pub async fn attach_deferred_poster(
        &self,
        schedule_id: i64,
        bytes: &[u8],
        content_type: &str,
        actor: &Actor,
        ip: Option<String>,
    ) -> Result<Content, ModerationError> {
        self.validate_upload(bytes, content_type)?;
        let kind = ContentKind::Schedule;
        let id = ContentId::Int(schedule_id);

        let mut tx = self.repo.begin().await?;
        let mut content = tx
            .find(kind, &id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, &id))?;
        if !self.policy.can_edit_content(content.as_reviewable(), actor) {
            return Err(ModerationError::Forbidden);
        }
        if content.status() == ReviewStatus::Approved {
            return Err(ModerationError::InvalidTransition {
                from: ReviewStatus::Approved,
                action: "attach a deferred poster to",
            });
        }

        let Content::Schedule(schedule) = &mut content else {
            return Err(ModerationError::not_found(kind, &id));
        };

        let key = format!(
            "{}/schedule-{}-{}.{}",
            self.uploads.temp_prefix.trim_end_matches('/'),
            schedule_id,
            Uuid::new_v4().simple(),
            self.uploads.get_extension(content_type)
        );
        self.storage
            .put(&key, bytes, content_type)
            .await
            .map_err(|e| anyhow::Error::new(e).context("Failed to store poster upload"))?;

        let replaced = schedule.pending_poster.replace(key.clone());
        schedule.meta.updated_at = Utc::now();

        let entry = AdminLogEntry::new(
            actor,
            LogAction::Update,
            kind.into(),
            Some(id.to_string()),
            format!("Attached deferred poster to schedule: {}", content.title()),
        )
        .with_details(json!({ "pending_poster": key, "size": bytes.len() }))
        .with_ip(ip);

        let persisted = async {
            tx.update(&content).await?;
            audit::record(tx.as_mut(), entry).await?;
            tx.commit().await
        }
        .await;
        if let Err(e) = persisted {
            if let Err(cleanup) = self.storage.delete(&key).await {
                tracing::warn!("Failed to remove orphaned temp poster {}: {}", key, cleanup);
            }
            return Err(e.into());
        }

        if let Some(old) = replaced {
            if let Err(e) = self.storage.delete(&old).await {
                tracing::warn!("Failed to remove replaced temp poster {}: {}", old, e);
            }
        }
        tracing::info!(id = schedule_id, operator = actor.id, "Deferred poster stored at {}", key);
        Ok(content)
    }

    /// Published content for anyone; unpublished content only for actors
    /// who may edit it. Everything else reads as missing.
    pub async fn get(
        &self,
        kind: ContentKind,
        id: &ContentId,
        actor: Option<&Actor>,
    ) -> Result<Content, ModerationError> {
        let content = self
            .repo
            .get(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;
        if content.is_published() {
            return Ok(content);
        }
        match actor {
            Some(actor) if self.policy.can_edit_content(content.as_reviewable(), actor) => Ok(content),
            _ => Err(ModerationError::not_found(kind, id)),
        }
    }

    pub async fn list_mine(
        &self,
        actor: &Actor,
        kind: Option<ContentKind>,
        status: Option<ReviewStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Content>, ModerationError> {
        let filter = ContentFilter {
            kind,
            status,
            owner_id: Some(actor.id),
        };
        let total = self.repo.count(&filter).await?;
        let items = self
            .repo
            .list(&filter, params.offset(), params.limit())
            .await?;
        Ok(PagedResult::new(items, total, params))
    }

    fn validate_upload(&self, bytes: &[u8], content_type: &str) -> Result<(), ModerationError> {
        if bytes.is_empty() {
            return Err(ModerationError::ValidationError("Uploaded file is empty".to_string()));
        }
        if bytes.len() as u64 > self.uploads.max_file_size {
            return Err(ModerationError::ValidationError(format!(
                "File too large: {} bytes (max {})",
                bytes.len(),
                self.uploads.max_file_size
            )));
        }
        if !self.uploads.is_type_allowed(content_type) {
            return Err(ModerationError::ValidationError(format!(
                "File type not allowed: {}",
                content_type
            )));
        }
        Ok(())
    }
}

/// First free slug among `base`, `base-2`, `base-3`, …
async fn unique_slug(
    tx: &mut dyn crate::db::repositories::WriteTx,
    title: &str,
) -> Result<String, ModerationError> {
    let mut base = generate_slug(title);
    if base.is_empty() {
        base = "article".to_string();
    }
    if !tx.slug_exists(&base).await? {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !tx.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// URL slug from a title. ASCII is lowercased, CJK and other non-ASCII
/// characters are kept, everything else collapses into single hyphens.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || !c.is_ascii() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            if !c.is_whitespace() {
                slug.push(c);
            } else {
                pending_hyphen = true;
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        AdminLogRepository, SqlxAdminLogRepository, SqlxContentRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{AdminLogFilter, ArticleInput, ScheduleInput, VideoInput};
    use crate::services::storage::{LocalObjectStorage, ObjectStorage, StorageError, StorageResult};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixture {
        service: ContentService,
        storage: DynObjectStorage,
        logs: Arc<dyn AdminLogRepository>,
        _dir: TempDir,
    }

    async fn setup_with(policy: PermissionPolicy) -> Fixture {
        let pool: DynDatabasePool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role) VALUES \
             (1, 'fan', 'fan@x.com', 'h', 'user'), (2, 'other', 'o@x.com', 'h', 'user'), \
             (3, 'mod', 'mod@x.com', 'h', 'admin'), (4, 'root', 'r@x.com', 'h', 'super_admin')",
        )
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap();

        let dir = TempDir::new().unwrap();
        let storage: DynObjectStorage = Arc::new(LocalObjectStorage::new(dir.path(), "/uploads"));
        let service = ContentService::new(
            SqlxContentRepository::boxed(pool.clone()),
            storage.clone(),
            policy,
            StorageConfig::default(),
        );
        Fixture {
            service,
            storage,
            logs: SqlxAdminLogRepository::boxed(pool),
            _dir: dir,
        }
    }

    async fn setup() -> Fixture {
        setup_with(PermissionPolicy::default()).await
    }

    fn fan() -> Actor {
        Actor::new(1, "fan", Role::User)
    }

    fn other() -> Actor {
        Actor::new(2, "other", Role::User)
    }

    fn moderator() -> Actor {
        Actor::new(3, "mod", Role::Admin)
    }

    fn root() -> Actor {
        Actor::new(4, "root", Role::SuperAdmin)
    }

    fn article(title: &str, category: Option<&str>) -> ContentInput {
        ContentInput::Article(ArticleInput {
            title: title.into(),
            content: "body".into(),
            excerpt: None,
            category_primary: category.map(str::to_string),
            category_secondary: None,
            tags: vec![],
            cover_url: None,
        })
    }

    fn video(title: &str) -> ContentInput {
        ContentInput::Video(VideoInput {
            title: title.into(),
            description: None,
            category: None,
            bvid: "BV1xx411c7mD".into(),
            publish_date: None,
            cover: None,
        })
    }

    fn schedule() -> ContentInput {
        ContentInput::Schedule(ScheduleInput {
            category: "演唱会".into(),
            date: "2025-05-20".into(),
            city: None,
            venue: None,
            theme: "巡演".into(),
            description: None,
        })
    }

    async fn log_count(f: &Fixture, action: LogAction) -> i64 {
        let filter = AdminLogFilter {
            action: Some(action),
            ..Default::default()
        };
        f.logs.count(&filter).await.unwrap()
    }

    async fn approve_directly(f: &Fixture, content: &Content) {
        let mut tx = f.service.repo.begin().await.unwrap();
        let mut stored = tx.find(content.kind(), &content.id()).await.unwrap().unwrap();
        stored.as_reviewable_mut().set_status(ReviewStatus::Approved);
        tx.update(&stored).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Storage that refuses every write
    struct ReadOnlyStorage;

    #[async_trait]
    impl ObjectStorage for ReadOnlyStorage {
        async fn put(&self, _: &str, _: &[u8], _: &str) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("read-only")))
        }
        async fn get(&self, _: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::Io(std::io::Error::other("read-only")))
        }
        async fn copy(&self, _: &str, _: &str) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("read-only")))
        }
        async fn delete(&self, _: &str) -> StorageResult<()> {
            Ok(())
        }
        fn url_for(&self, key: &str) -> String {
            key.to_string()
        }
    }

    #[tokio::test]
    async fn test_create_defaults_to_draft_and_logs() {
        let f = setup().await;

        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();

        assert_eq!(created.status(), ReviewStatus::Draft);
        assert_eq!(created.owner_id(), Some(1));
        assert_eq!(log_count(&f, LogAction::Create).await, 1);
    }

    #[tokio::test]
    async fn test_create_initial_status_rules() {
        let f = setup().await;

        let pending = f
            .service
            .create(video("Queued"), &fan(), Some(ReviewStatus::Pending), None)
            .await
            .unwrap();
        assert_eq!(pending.status(), ReviewStatus::Pending);

        for status in [ReviewStatus::Approved, ReviewStatus::Rejected] {
            let result = f.service.create(video("Sneaky"), &fan(), Some(status), None).await;
            assert!(matches!(result, Err(ModerationError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_create_permissions() {
        let f = setup().await;
        let guest = Actor::new(9, "guest", Role::Guest);

        assert!(matches!(
            f.service.create(video("x"), &guest, None, None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(matches!(
            f.service.create(schedule(), &fan(), None, None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(f.service.create(schedule(), &moderator(), None, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_article_category_gate() {
        let f = setup().await;

        assert!(f.service.create(article("Fan post", Some("峰迷荟萃")), &fan(), None, None).await.is_ok());
        assert!(matches!(
            f.service.create(article("Staff post", Some("资料科普")), &fan(), None, None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(f
            .service
            .create(article("Staff post", Some("资料科普")), &moderator(), None, None)
            .await
            .is_ok());
        assert!(matches!(
            f.service.create(article("Fan post", Some("峰迷荟萃")), &moderator(), None, None).await,
            Err(ModerationError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = setup().await;
        let result = f.service.create(video("  "), &fan(), None, None).await;
        assert!(matches!(result, Err(ModerationError::ValidationError(_))));
        assert_eq!(log_count(&f, LogAction::Create).await, 0);
    }

    #[tokio::test]
    async fn test_article_slugs_are_unique() {
        let f = setup().await;

        let mut slugs = Vec::new();
        for _ in 0..3 {
            let created = f
                .service
                .create(article("Hello World", Some("峰迷荟萃")), &fan(), None, None)
                .await
                .unwrap();
            let Content::Article(a) = created else { unreachable!() };
            slugs.push(a.slug);
        }

        assert_eq!(slugs, vec!["hello-world", "hello-world-2", "hello-world-3"]);
    }

    #[tokio::test]
    async fn test_submit_and_resubmit_keep_reviewer_fields() {
        let f = setup().await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();

        let submitted = f.service.submit(ContentKind::Video, &created.id(), &fan(), None).await.unwrap();
        assert_eq!(submitted.status(), ReviewStatus::Pending);

        let again = f.service.submit(ContentKind::Video, &created.id(), &fan(), None).await;
        assert!(matches!(again, Err(ModerationError::InvalidTransition { .. })));

        let by_other = f.service.submit(ContentKind::Video, &created.id(), &other(), None).await;
        assert!(matches!(by_other, Err(ModerationError::Forbidden)));

        // Simulate a rejection, then resubmit
        let mut tx = f.service.repo.begin().await.unwrap();
        let mut stored = tx.find(ContentKind::Video, &created.id()).await.unwrap().unwrap();
        lifecycle::apply_review(
            stored.as_reviewable_mut(),
            lifecycle::ReviewDecision::Reject,
            &moderator(),
            Some("blurry"),
            Utc::now(),
        )
        .unwrap();
        tx.update(&stored).await.unwrap();
        tx.commit().await.unwrap();

        let resubmitted = f.service.submit(ContentKind::Video, &created.id(), &fan(), None).await.unwrap();
        assert_eq!(resubmitted.status(), ReviewStatus::Pending);
        assert_eq!(resubmitted.meta().review.review_notes.as_deref(), Some("blurry"));
        assert_eq!(resubmitted.meta().review.reviewer_id, Some(3));
    }

    #[tokio::test]
    async fn test_update_rules() {
        let f = setup().await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();

        let updated = f
            .service
            .update(ContentKind::Video, &created.id(), video("Encore (4K)"), &fan(), None)
            .await
            .unwrap();
        assert_eq!(updated.title(), "Encore (4K)");
        assert_eq!(updated.owner_id(), Some(1));

        assert!(matches!(
            f.service.update(ContentKind::Video, &created.id(), video("Mine now"), &other(), None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(f
            .service
            .update(ContentKind::Video, &created.id(), video("Staff fix"), &moderator(), None)
            .await
            .is_ok());
        assert!(matches!(
            f.service.update(ContentKind::Video, &created.id(), schedule(), &moderator(), None).await,
            Err(ModerationError::ValidationError(_))
        ));
        assert_eq!(log_count(&f, LogAction::Update).await, 2);
    }

    #[tokio::test]
    async fn test_owner_edit_of_approved_content() {
        let f = setup().await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();
        approve_directly(&f, &created).await;

        let kept = f
            .service
            .update(ContentKind::Video, &created.id(), video("Edited"), &fan(), None)
            .await
            .unwrap();
        assert_eq!(kept.status(), ReviewStatus::Approved);

        let strict = setup_with(PermissionPolicy::from_config(&crate::config::ModerationConfig {
            requeue_approved_on_owner_edit: true,
            ..Default::default()
        }))
        .await;
        let created = strict.service.create(video("Encore"), &fan(), None, None).await.unwrap();
        approve_directly(&strict, &created).await;

        let requeued = strict
            .service
            .update(ContentKind::Video, &created.id(), video("Edited"), &fan(), None)
            .await
            .unwrap();
        assert_eq!(requeued.status(), ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_is_soft_and_permissioned() {
        let f = setup().await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();

        assert!(matches!(
            f.service.delete(ContentKind::Video, &created.id(), &other(), None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(matches!(
            f.service.delete(ContentKind::Video, &created.id(), &moderator(), None).await,
            Err(ModerationError::Forbidden)
        ));

        f.service.delete(ContentKind::Video, &created.id(), &fan(), None).await.unwrap();
        assert!(matches!(
            f.service.get(ContentKind::Video, &created.id(), Some(&root())).await,
            Err(ModerationError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.delete(ContentKind::Video, &created.id(), &root(), None).await,
            Err(ModerationError::NotFound { .. })
        ));
        assert_eq!(log_count(&f, LogAction::Delete).await, 1);
    }

    #[tokio::test]
    async fn test_owner_delete_of_published_content_follows_policy() {
        let f = setup_with(PermissionPolicy::from_config(&crate::config::ModerationConfig {
            owner_can_delete_published: false,
            ..Default::default()
        }))
        .await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();
        approve_directly(&f, &created).await;

        assert!(matches!(
            f.service.delete(ContentKind::Video, &created.id(), &fan(), None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(f.service.delete(ContentKind::Video, &created.id(), &root(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_visibility() {
        let f = setup().await;
        let created = f.service.create(video("Encore"), &fan(), None, None).await.unwrap();
        let id = created.id();

        assert!(f.service.get(ContentKind::Video, &id, Some(&fan())).await.is_ok());
        assert!(f.service.get(ContentKind::Video, &id, Some(&moderator())).await.is_ok());
        assert!(matches!(
            f.service.get(ContentKind::Video, &id, Some(&other())).await,
            Err(ModerationError::NotFound { .. })
        ));
        assert!(f.service.get(ContentKind::Video, &id, None).await.is_err());

        approve_directly(&f, &created).await;
        assert!(f.service.get(ContentKind::Video, &id, None).await.unwrap().is_published());
    }

    #[tokio::test]
    async fn test_list_mine() {
        let f = setup().await;
        f.service.create(video("a"), &fan(), None, None).await.unwrap();
        f.service.create(video("b"), &fan(), Some(ReviewStatus::Pending), None).await.unwrap();
        f.service.create(video("c"), &other(), None, None).await.unwrap();

        let mine = f.service.list_mine(&fan(), None, None, &ListParams::default()).await.unwrap();
        assert_eq!(mine.total, 2);

        let pending = f
            .service
            .list_mine(&fan(), Some(ContentKind::Video), Some(ReviewStatus::Pending), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.items[0].title(), "b");
    }

    #[tokio::test]
    async fn test_attach_deferred_poster() {
        let f = setup().await;
        let created = f.service.create(schedule(), &moderator(), None, None).await.unwrap();
        let ContentId::Int(id) = created.id() else { unreachable!() };

        let first = f
            .service
            .attach_deferred_poster(id, b"one", "image/png", &moderator(), None)
            .await
            .unwrap();
        let Content::Schedule(s) = &first else { unreachable!() };
        let first_key = s.pending_poster.clone().unwrap();
        assert!(first_key.starts_with("tmp/schedule-"));
        assert!(first_key.ends_with(".png"));
        assert_eq!(f.storage.get(&first_key).await.unwrap(), b"one");

        let second = f
            .service
            .attach_deferred_poster(id, b"two", "image/jpeg", &moderator(), None)
            .await
            .unwrap();
        let Content::Schedule(s) = &second else { unreachable!() };
        assert_ne!(s.pending_poster.as_deref(), Some(first_key.as_str()));
        assert!(f.storage.get(&first_key).await.is_err());
    }

    #[tokio::test]
    async fn test_attach_deferred_poster_rejects_bad_uploads() {
        let f = setup().await;
        let created = f.service.create(schedule(), &moderator(), None, None).await.unwrap();
        let ContentId::Int(id) = created.id() else { unreachable!() };

        for (bytes, content_type) in [(&b""[..], "image/png"), (&b"x"[..], "application/pdf")] {
            let result = f
                .service
                .attach_deferred_poster(id, bytes, content_type, &moderator(), None)
                .await;
            assert!(matches!(result, Err(ModerationError::ValidationError(_))));
        }
        assert!(matches!(
            f.service.attach_deferred_poster(id, b"x", "image/png", &fan(), None).await,
            Err(ModerationError::Forbidden)
        ));
        assert!(matches!(
            f.service.attach_deferred_poster(999, b"x", "image/png", &moderator(), None).await,
            Err(ModerationError::NotFound { .. })
        ));

        approve_directly(&f, &created).await;
        assert!(matches!(
            f.service.attach_deferred_poster(id, b"x", "image/png", &moderator(), None).await,
            Err(ModerationError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_poster_store_failure_is_internal() {
        let f = setup().await;
        let created = f.service.create(schedule(), &moderator(), None, None).await.unwrap();
        let ContentId::Int(id) = created.id() else { unreachable!() };
        let service = ContentService::new(
            f.service.repo.clone(),
            Arc::new(ReadOnlyStorage),
            PermissionPolicy::default(),
            StorageConfig::default(),
        );

        let result = service
            .attach_deferred_poster(id, b"x", "image/png", &moderator(), None)
            .await;

        assert!(matches!(result, Err(ModerationError::InternalError(_))));
        let stored = f
            .service
            .get(ContentKind::Schedule, &created.id(), Some(&moderator()))
            .await
            .unwrap();
        let Content::Schedule(s) = stored else { unreachable!() };
        assert!(s.pending_poster.is_none());
        assert_eq!(log_count(&f, LogAction::Update).await, 0);
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("Hello, World!"), "hello-world");
        assert_eq!(generate_slug("  --Tour__2025--  "), "tour-2025");
        assert_eq!(generate_slug("巡演 Live"), "巡演-live");
        assert_eq!(generate_slug("!!!"), "");
    }
}
