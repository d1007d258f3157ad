//! Review coordinator
//!
//! The only path by which content becomes approved or rejected. One review
//! runs inside a single write transaction:
//!
//! 1. load the live item (`NotFound` otherwise)
//! 2. `can_review` (`Forbidden`)
//! 3. state machine check and rejection notes (`InvalidTransition`,
//!    `ValidationError`)
//! 4. publish side effects on approval, bounded by a deadline
//!    (`SideEffectFailure`)
//! 5. persist the item and its audit entry, commit
//!
//! Any failure before commit leaves the stored item untouched.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::db::repositories::{ContentRepository, WriteTx};
use crate::models::{
    Actor, AdminLogEntry, Content, ContentFilter, ContentId, ContentKind, ListParams, LogAction,
    PagedResult, ReviewStatistics, ReviewStatus,
};
use crate::services::audit;
use crate::services::error::ModerationError;
use crate::services::lifecycle::{apply_review, ReviewDecision};
use crate::services::permissions::PermissionPolicy;
use crate::services::publish::{PublishArtifact, PublishSideEffect};

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(15);

/// Plain-text description length in review listings
const DESCRIPTION_LIMIT: usize = 150;

static TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[^>]+>").ok());

type Materialized = Vec<(Arc<dyn PublishSideEffect>, PublishArtifact)>;

pub struct ReviewCoordinator {
    repo: Arc<dyn ContentRepository>,
    policy: PermissionPolicy,
    side_effects: Vec<Arc<dyn PublishSideEffect>>,
    publish_timeout: Duration,
}

impl ReviewCoordinator {
    pub fn new(repo: Arc<dyn ContentRepository>, policy: PermissionPolicy) -> Self {
        Self {
            repo,
            policy,
            side_effects: Vec::new(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_side_effect(mut self, effect: Arc<dyn PublishSideEffect>) -> Self {
        self.side_effects.push(effect);
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Approve or reject one item and return it as stored
    pub async fn review(
        &self,
        kind: ContentKind,
        id: &ContentId,
        decision: ReviewDecision,
        actor: &Actor,
        notes: Option<&str>,
        ip: Option<String>,
    ) -> Result<Content, ModerationError> {
        let mut tx = self.repo.begin().await?;
        let mut content = tx
            .find(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;

        if !self.policy.can_review(actor) {
            return Err(ModerationError::Forbidden);
        }

        let previous = content.status();
        let next = apply_review(content.as_reviewable_mut(), decision, actor, notes, Utc::now())?;

        let artifacts = match decision {
            ReviewDecision::Approve => self.materialize(&mut content).await?,
            ReviewDecision::Reject => Vec::new(),
        };

        let (action, verb) = match decision {
            ReviewDecision::Approve => (LogAction::Approve, "Approved"),
            ReviewDecision::Reject => (LogAction::Reject, "Rejected"),
        };
        let entry = AdminLogEntry::new(
            actor,
            action,
            kind.into(),
            Some(id.to_string()),
            format!("{} {}: {}", verb, kind, content.title()),
        )
        .with_details(json!({
            "from": previous,
            "to": next,
            "notes": content.meta().review.review_notes,
        }))
        .with_ip(ip);

        if let Err(e) = persist(tx, &content, entry).await {
            tracing::error!("Review of {} {} failed to persist, discarding artifacts: {}", kind, id, e);
            for (effect, artifact) in &artifacts {
                effect.discard(artifact).await;
            }
            return Err(e.into());
        }
        for (effect, artifact) in &artifacts {
            effect.finalize(artifact).await;
        }

        tracing::info!(
            kind = %kind,
            id = %id,
            operator = actor.id,
            "{} {} -> {}",
            verb,
            previous,
            next
        );
        Ok(content)
    }

    /// Review queue across kinds, newest first
    pub async fn list(
        &self,
        actor: &Actor,
        filter: &ContentFilter,
        params: &ListParams,
    ) -> Result<PagedResult<ReviewItem>, ModerationError> {
        if !self.policy.can_review(actor) {
            return Err(ModerationError::Forbidden);
        }
        let total = self.repo.count(filter).await?;
        let items = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await?;
        Ok(PagedResult::new(items, total, params).map(|c| ReviewItem::from_content(&c)))
    }

    /// Pending queue, optionally narrowed to one kind
    pub async fn list_pending(
        &self,
        actor: &Actor,
        kind: Option<ContentKind>,
        params: &ListParams,
    ) -> Result<PagedResult<ReviewItem>, ModerationError> {
        let filter = ContentFilter {
            kind,
            status: Some(ReviewStatus::Pending),
            owner_id: None,
        };
        self.list(actor, &filter, params).await
    }

    pub async fn detail(
        &self,
        actor: &Actor,
        kind: ContentKind,
        id: &ContentId,
    ) -> Result<ReviewItem, ModerationError> {
        if !self.policy.can_review(actor) {
            return Err(ModerationError::Forbidden);
        }
        let content = self
            .repo
            .get(kind, id)
            .await?
            .ok_or_else(|| ModerationError::not_found(kind, id))?;
        Ok(ReviewItem::from_content(&content))
    }

    pub async fn statistics(&self, actor: &Actor) -> Result<ReviewStatistics, ModerationError> {
        if !self.policy.can_review(actor) {
            return Err(ModerationError::Forbidden);
        }
        Ok(ReviewStatistics::from_counts(self.repo.status_counts().await?))
    }

    /// Run every applicable side effect under one publish deadline. On
    /// failure, artifacts already produced are discarded.
    async fn materialize(&self, content: &mut Content) -> Result<Materialized, ModerationError> {
        let deadline = Instant::now() + self.publish_timeout;
        let mut done: Materialized = Vec::new();

        for effect in &self.side_effects {
            if !effect.applies_to(content) {
                continue;
            }
            let failure = match self.run_effect(effect, content, deadline).await {
                Ok(artifact) => {
                    done.push((effect.clone(), artifact));
                    continue;
                }
                Err(failure) => failure,
            };

            tracing::warn!("Publish side effect for {} {} failed: {}", content.kind(), content.id(), failure);
            for (effect, artifact) in &done {
                effect.discard(artifact).await;
            }
            return Err(ModerationError::SideEffectFailure(failure));
        }
        Ok(done)
    }

    /// Plan, then write on a separate task. A write cut off by the deadline
    /// keeps running, so its planned keys are discarded both at once and
    /// again once the task settles.
    async fn run_effect(
        &self,
        effect: &Arc<dyn PublishSideEffect>,
        content: &mut Content,
        deadline: Instant,
    ) -> Result<PublishArtifact, String> {
        let timed_out = || format!("timed out after {}s", self.publish_timeout.as_secs_f32());

        let artifact = match tokio::time::timeout_at(deadline, effect.plan(content)).await {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(timed_out()),
        };

        let task_effect = effect.clone();
        let planned = artifact.clone();
        let mut draft = content.clone();
        let mut handle = tokio::spawn(async move {
            let result = task_effect.materialize(&mut draft, &planned).await;
            (draft, result)
        });

        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok((draft, Ok(())))) => {
                *content = draft;
                Ok(artifact)
            }
            Ok(Ok((_, Err(e)))) => {
                effect.discard(&artifact).await;
                Err(e.to_string())
            }
            Ok(Err(e)) => {
                effect.discard(&artifact).await;
                Err(format!("side effect task failed: {}", e))
            }
            Err(_) => {
                effect.discard(&artifact).await;
                let late = effect.clone();
                tokio::spawn(async move {
                    if handle.await.is_ok() {
                        late.discard(&artifact).await;
                    }
                });
                Err(timed_out())
            }
        }
    }
}

async fn persist(mut tx: Box<dyn WriteTx>, content: &Content, entry: AdminLogEntry) -> anyhow::Result<()> {
    tx.update(content).await?;
    audit::record(tx.as_mut(), entry).await?;
    tx.commit().await
}

/// Common shape of one item in the review queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: ContentId,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub title: String,
    pub author: Option<String>,
    pub author_id: Option<i64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub review_status: ReviewStatus,
    pub is_published: bool,
    pub reviewer_id: Option<i64>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bvid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

impl ReviewItem {
    pub fn from_content(content: &Content) -> Self {
        let meta = content.meta();
        let mut item = Self {
            id: content.id(),
            kind: content.kind(),
            title: content.title().to_string(),
            author: None,
            author_id: meta.owner_id,
            category: content.category().map(str::to_string),
            description: None,
            tags: Vec::new(),
            review_status: meta.review_status,
            is_published: meta.is_published(),
            reviewer_id: meta.review.reviewer_id,
            review_notes: meta.review.review_notes.clone(),
            reviewed_at: meta.review.reviewed_at,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            cover_image: None,
            bvid: None,
            date: None,
            city: None,
            venue: None,
        };

        match content {
            Content::Article(a) => {
                item.author = Some(a.author.clone());
                item.category = article_category(a.category_primary.as_deref(), a.category_secondary.as_deref());
                item.description = a.excerpt.as_deref().map(plain_text);
                item.tags = a.tags.clone();
                item.cover_image = a.cover_url.clone();
            }
            Content::Video(v) => {
                item.author = Some(v.author.clone());
                item.description = v.description.as_deref().map(plain_text);
                item.cover_image = v.cover.clone();
                item.bvid = Some(v.bvid.clone());
            }
            Content::Gallery(g) => {
                item.description = g.description.clone();
                item.cover_image = g.cover_thumb_url.clone().or_else(|| g.cover_image_url.clone());
                item.date = g.date.clone();
            }
            Content::Schedule(s) => {
                item.description = s.description.clone();
                item.cover_image = s.image_thumb.clone().or_else(|| s.image.clone());
                item.date = Some(s.date.clone());
                item.city = s.city.clone();
                item.venue = s.venue.clone();
            }
        }
        item
    }
}

/// `primary > secondary`, skipping missing parts
fn article_category(primary: Option<&str>, secondary: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [primary, secondary]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" > "))
    }
}

/// Tags stripped, whitespace collapsed, cut to the listing limit
pub fn plain_text(html: &str) -> String {
    let stripped = match TAG_RE.as_ref() {
        Some(re) => re.replace_all(html, ""),
        None => html.into(),
    };
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > DESCRIPTION_LIMIT {
        let cut: String = collapsed.chars().take(DESCRIPTION_LIMIT).collect();
        format!("{}...", cut)
    } else {
        collapsed
    }
}
