//! Publish-time side effects
//!
//! Some kinds produce a physical artifact when they are approved. For
//! schedules this is the deferred poster: uploaded into the temp area
//! while the entry waited for review, and copied to its permanent,
//! content-addressed key at approval.
//!
//! Publishing runs in two phases around the database commit:
//!
//! ```text
//! plan ──► materialize ──► commit ok ──► finalize (drop the temp object)
//!               │
//!               └────────► failed, timed out or commit failed
//!                                ──► discard (drop the permanent copy)
//! ```
//!
//! `plan` writes nothing and names every key `materialize` may write, so
//! the permanent copy can be discarded even when `materialize` never
//! returns. The temp object survives until commit, so a failed approval
//! can be retried as a whole.

use async_trait::async_trait;
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

use crate::models::{Content, Schedule};
use crate::services::storage::{DynObjectStorage, StorageError};

/// Digest characters kept in published object keys
const DIGEST_PREFIX_LEN: usize = 16;

/// Keys one publish touches, from `plan` through `finalize` or `discard`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishArtifact {
    pub temp_key: Option<String>,
    pub permanent_key: Option<String>,
}

#[async_trait]
pub trait PublishSideEffect: Send + Sync + 'static {
    fn applies_to(&self, content: &Content) -> bool;

    /// Work out the keys without writing anything
    async fn plan(&self, content: &Content) -> Result<PublishArtifact, StorageError>;

    /// Write the planned permanent artifact and point `content` at it.
    /// Must leave the temp object in place.
    async fn materialize(&self, content: &mut Content, plan: &PublishArtifact) -> Result<(), StorageError>;

    /// After commit: remove what is no longer referenced. Best effort.
    async fn finalize(&self, artifact: &PublishArtifact);

    /// After a failed commit: remove the permanent copy. Best effort.
    async fn discard(&self, artifact: &PublishArtifact);
}

/// Moves a schedule's deferred poster into `schedules/…`
pub struct SchedulePosterPublisher {
    storage: DynObjectStorage,
    default_poster_url: Option<String>,
}

impl SchedulePosterPublisher {
    pub fn new(storage: DynObjectStorage, default_poster_url: Option<String>) -> Self {
        Self {
            storage,
            default_poster_url,
        }
    }
}

#[async_trait]
impl PublishSideEffect for SchedulePosterPublisher {
    fn applies_to(&self, content: &Content) -> bool {
        matches!(content, Content::Schedule(_))
    }

    async fn plan(&self, content: &Content) -> Result<PublishArtifact, StorageError> {
        let Content::Schedule(schedule) = content else {
            return Ok(PublishArtifact::default());
        };
        let Some(temp_key) = schedule.pending_poster.clone() else {
            return Ok(PublishArtifact::default());
        };

        let bytes = self.storage.get(&temp_key).await?;
        let key = poster_key(schedule, &bytes, extension_of(&temp_key));
        Ok(PublishArtifact {
            temp_key: Some(temp_key),
            permanent_key: Some(key),
        })
    }

    async fn materialize(&self, content: &mut Content, plan: &PublishArtifact) -> Result<(), StorageError> {
        let Content::Schedule(schedule) = content else {
            return Ok(());
        };

        let (Some(temp_key), Some(key)) = (&plan.temp_key, &plan.permanent_key) else {
            if schedule.image.is_none() {
                if let Some(url) = &self.default_poster_url {
                    schedule.image = Some(url.clone());
                    schedule.image_thumb = Some(url.clone());
                }
            }
            return Ok(());
        };

        self.storage.copy(temp_key, key).await?;

        let url = self.storage.url_for(key);
        schedule.image = Some(url.clone());
        schedule.image_thumb = Some(url);
        schedule.pending_poster = None;

        tracing::info!("Materialized poster for schedule {} at {}", schedule.id, key);
        Ok(())
    }

    async fn finalize(&self, artifact: &PublishArtifact) {
        if let Some(key) = &artifact.temp_key {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!("Failed to remove temp poster {}: {}", key, e);
            }
        }
    }

    async fn discard(&self, artifact: &PublishArtifact) {
        if let Some(key) = &artifact.permanent_key {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!("Failed to discard published poster {}: {}", key, e);
            }
        }
    }
}

/// `schedules/{category}/{date}-{theme}/schedule-{id}-poster-{digest}.{ext}`
pub fn poster_key(schedule: &Schedule, bytes: &[u8], ext: &str) -> String {
    let digest = HEXLOWER.encode(&Sha256::digest(bytes));
    format!(
        "schedules/{}/{}/schedule-{}-poster-{}.{}",
        sanitize_segment(&schedule.category),
        sanitize_segment(&format!("{}-{}", schedule.date, schedule.theme)),
        schedule.id,
        &digest[..DIGEST_PREFIX_LEN],
        ext
    )
}

/// One path segment: separators and shell-hostile characters removed,
/// spaces turned into underscores
fn sanitize_segment(value: &str) -> String {
    const UNSAFE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n', '\r', '\t'];

    let cleaned: String = value.chars().filter(|c| !UNSAFE.contains(c)).collect();
    let cleaned = cleaned.trim().replace(' ', "_");
    if cleaned.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        cleaned
    }
}

fn extension_of(key: &str) -> &str {
    match key.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 && !ext.contains('/') => ext,
        _ => "jpg",
    }
}
