//! Reviewable content
//!
//! Four content kinds share one moderation lifecycle:
//! - Article (UUID id)
//! - Video (UUID id)
//! - PhotoGroup, exposed as the `gallery` kind (UUID id)
//! - Schedule (integer id)
//!
//! Each concrete struct carries a `ContentMeta` with ownership and review
//! state and implements [`Reviewable`]. [`Content`] is the sum type the
//! services pattern-match on.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Actor;

/// Review lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Work in progress, visible to its owner and staff only
    #[default]
    Draft,
    /// Waiting for a reviewer
    Pending,
    /// Published
    Approved,
    /// Sent back to the owner with notes
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Draft,
        ReviewStatus::Pending,
        ReviewStatus::Approved,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Draft => "draft",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ReviewStatus::Draft),
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid review status: {}", s)),
        }
    }
}

/// Content kind discriminator used in URLs, tables and audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Article,
    Video,
    Gallery,
    Schedule,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Article,
        ContentKind::Video,
        ContentKind::Gallery,
        ContentKind::Schedule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Video => "video",
            ContentKind::Gallery => "gallery",
            ContentKind::Schedule => "schedule",
        }
    }

    /// Backing table name
    pub fn table(self) -> &'static str {
        match self {
            ContentKind::Article => "articles",
            ContentKind::Video => "videos",
            ContentKind::Gallery => "photo_groups",
            ContentKind::Schedule => "schedules",
        }
    }

    /// Parse a path segment into an id of the right shape for this kind.
    ///
    /// Returns `None` when the segment cannot identify any row of this kind.
    pub fn parse_id(self, raw: &str) -> Option<ContentId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            ContentKind::Schedule => raw.parse::<i64>().ok().map(ContentId::Int),
            _ => Some(ContentId::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" => Ok(ContentKind::Article),
            "video" => Ok(ContentKind::Video),
            "gallery" => Ok(ContentKind::Gallery),
            "schedule" => Ok(ContentKind::Schedule),
            _ => Err(anyhow::anyhow!("Invalid content kind: {}", s)),
        }
    }
}

/// Content identifier. Schedules use integer keys, everything else UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentId {
    Text(String),
    Int(i64),
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentId::Text(s) => f.write_str(s),
            ContentId::Int(n) => write!(f, "{}", n),
        }
    }
}

/// Fields written only by a review action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFields {
    pub reviewer_id: Option<i64>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Ownership, review and tombstone state shared by every content kind.
///
/// Serialized through `MetaView`, which adds the computed `is_published`
/// and drops the tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MetaView")]
pub struct ContentMeta {
    /// Creating user; `None` for seeded content
    pub owner_id: Option<i64>,
    pub review_status: ReviewStatus,
    #[serde(flatten)]
    pub review: ReviewFields,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct MetaView {
    owner_id: Option<i64>,
    review_status: ReviewStatus,
    #[serde(flatten)]
    review: ReviewFields,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContentMeta> for MetaView {
    fn from(meta: ContentMeta) -> Self {
        Self {
            is_published: meta.is_published(),
            owner_id: meta.owner_id,
            review_status: meta.review_status,
            review: meta.review,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        }
    }
}

impl ContentMeta {
    pub fn new(owner_id: Option<i64>, review_status: ReviewStatus, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            review_status,
            review: ReviewFields::default(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Publication is derived from the review status, never stored.
    pub fn is_published(&self) -> bool {
        self.review_status == ReviewStatus::Approved && !self.is_deleted
    }
}

/// Uniform moderation view over a concrete content kind.
pub trait Reviewable {
    fn kind(&self) -> ContentKind;
    fn content_id(&self) -> ContentId;
    fn title(&self) -> &str;
    /// Editorial category checked by `can_publish_category`
    fn category(&self) -> Option<&str>;
    fn meta(&self) -> &ContentMeta;
    fn meta_mut(&mut self) -> &mut ContentMeta;

    fn get_status(&self) -> ReviewStatus {
        self.meta().review_status
    }

    fn set_status(&mut self, status: ReviewStatus) {
        self.meta_mut().review_status = status;
    }

    fn get_owner(&self) -> Option<i64> {
        self.meta().owner_id
    }

    fn get_reviewer_fields(&self) -> &ReviewFields {
        &self.meta().review
    }

    fn set_reviewer_fields(&mut self, fields: ReviewFields) {
        self.meta_mut().review = fields;
    }

    fn is_published(&self) -> bool {
        self.meta().is_published()
    }
}

/// Long-form article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub author: String,
    pub category_primary: Option<String>,
    pub category_secondary: Option<String>,
    pub tags: Vec<String>,
    pub cover_url: Option<String>,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

/// Video entry referencing an upstream BV id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub category: Option<String>,
    pub bvid: String,
    pub publish_date: Option<String>,
    pub cover: Option<String>,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

/// Photo gallery group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoGroup {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub cover_thumb_url: Option<String>,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

/// Event schedule entry.
///
/// `pending_poster` holds the temp-storage key of a deferred poster upload;
/// `image` receives the permanent URL once the schedule is approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub category: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub theme: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub image_thumb: Option<String>,
    #[serde(skip_serializing, default)]
    pub pending_poster: Option<String>,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

impl Reviewable for Article {
    fn kind(&self) -> ContentKind {
        ContentKind::Article
    }
    fn content_id(&self) -> ContentId {
        ContentId::Text(self.id.clone())
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn category(&self) -> Option<&str> {
        self.category_primary.as_deref()
    }
    fn meta(&self) -> &ContentMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ContentMeta {
        &mut self.meta
    }
}

impl Reviewable for Video {
    fn kind(&self) -> ContentKind {
        ContentKind::Video
    }
    fn content_id(&self) -> ContentId {
        ContentId::Text(self.id.clone())
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
    fn meta(&self) -> &ContentMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ContentMeta {
        &mut self.meta
    }
}

impl Reviewable for PhotoGroup {
    fn kind(&self) -> ContentKind {
        ContentKind::Gallery
    }
    fn content_id(&self) -> ContentId {
        ContentId::Text(self.id.clone())
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
    fn meta(&self) -> &ContentMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ContentMeta {
        &mut self.meta
    }
}

impl Reviewable for Schedule {
    fn kind(&self) -> ContentKind {
        ContentKind::Schedule
    }
    fn content_id(&self) -> ContentId {
        ContentId::Int(self.id)
    }
    fn title(&self) -> &str {
        &self.theme
    }
    fn category(&self) -> Option<&str> {
        Some(&self.category)
    }
    fn meta(&self) -> &ContentMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ContentMeta {
        &mut self.meta
    }
}

/// Any reviewable content item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Article(Article),
    Video(Video),
    Gallery(PhotoGroup),
    Schedule(Schedule),
}

impl Content {
    pub fn as_reviewable(&self) -> &dyn Reviewable {
        match self {
            Content::Article(a) => a,
            Content::Video(v) => v,
            Content::Gallery(g) => g,
            Content::Schedule(s) => s,
        }
    }

    pub fn as_reviewable_mut(&mut self) -> &mut dyn Reviewable {
        match self {
            Content::Article(a) => a,
            Content::Video(v) => v,
            Content::Gallery(g) => g,
            Content::Schedule(s) => s,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.as_reviewable().kind()
    }

    pub fn id(&self) -> ContentId {
        self.as_reviewable().content_id()
    }

    pub fn status(&self) -> ReviewStatus {
        self.as_reviewable().get_status()
    }

    pub fn owner_id(&self) -> Option<i64> {
        self.as_reviewable().get_owner()
    }

    pub fn title(&self) -> &str {
        self.as_reviewable().title()
    }

    pub fn category(&self) -> Option<&str> {
        self.as_reviewable().category()
    }

    pub fn meta(&self) -> &ContentMeta {
        self.as_reviewable().meta()
    }

    pub fn is_published(&self) -> bool {
        self.as_reviewable().is_published()
    }

    /// Build a new item from creation input.
    ///
    /// Text ids are generated here; schedule ids are assigned on insert.
    pub fn from_input(
        input: ContentInput,
        owner: &Actor,
        status: ReviewStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let meta = ContentMeta::new(Some(owner.id), status, now);
        let id = Uuid::new_v4().to_string();
        match input {
            ContentInput::Article(i) => Content::Article(Article {
                id,
                slug: String::new(),
                title: i.title,
                content: i.content,
                excerpt: i.excerpt,
                author: owner.username.clone(),
                category_primary: i.category_primary,
                category_secondary: i.category_secondary,
                tags: i.tags,
                cover_url: i.cover_url,
                meta,
            }),
            ContentInput::Video(i) => Content::Video(Video {
                id,
                title: i.title,
                description: i.description,
                author: owner.username.clone(),
                category: i.category,
                bvid: i.bvid,
                publish_date: i.publish_date,
                cover: i.cover,
                meta,
            }),
            ContentInput::Gallery(i) => Content::Gallery(PhotoGroup {
                id,
                title: i.title,
                category: i.category,
                date: i.date,
                description: i.description,
                cover_image_url: i.cover_image_url,
                cover_thumb_url: i.cover_thumb_url,
                meta,
            }),
            ContentInput::Schedule(i) => Content::Schedule(Schedule {
                id: 0,
                category: i.category,
                date: i.date,
                city: i.city,
                venue: i.venue,
                theme: i.theme,
                description: i.description,
                image: None,
                image_thumb: None,
                pending_poster: None,
                meta,
            }),
        }
    }

    /// Replace the editable fields with `input`.
    ///
    /// Identity, ownership and review state are untouched. Fails when the
    /// input is for a different kind.
    pub fn apply_input(&mut self, input: ContentInput, now: DateTime<Utc>) -> Result<(), ContentKind> {
        match (self, input) {
            (Content::Article(a), ContentInput::Article(i)) => {
                a.title = i.title;
                a.content = i.content;
                a.excerpt = i.excerpt;
                a.category_primary = i.category_primary;
                a.category_secondary = i.category_secondary;
                a.tags = i.tags;
                a.cover_url = i.cover_url;
                a.meta.updated_at = now;
            }
            (Content::Video(v), ContentInput::Video(i)) => {
                v.title = i.title;
                v.description = i.description;
                v.category = i.category;
                v.bvid = i.bvid;
                v.publish_date = i.publish_date;
                v.cover = i.cover;
                v.meta.updated_at = now;
            }
            (Content::Gallery(g), ContentInput::Gallery(i)) => {
                g.title = i.title;
                g.category = i.category;
                g.date = i.date;
                g.description = i.description;
                g.cover_image_url = i.cover_image_url;
                g.cover_thumb_url = i.cover_thumb_url;
                g.meta.updated_at = now;
            }
            (Content::Schedule(s), ContentInput::Schedule(i)) => {
                s.category = i.category;
                s.date = i.date;
                s.city = i.city;
                s.venue = i.venue;
                s.theme = i.theme;
                s.description = i.description;
                s.meta.updated_at = now;
            }
            (_, other) => return Err(other.kind()),
        }
        Ok(())
    }
}

/// Editable article fields
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub excerpt: Option<String>,
    pub category_primary: Option<String>,
    pub category_secondary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cover_url: Option<String>,
}

/// Editable video fields
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInput {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub bvid: String,
    pub publish_date: Option<String>,
    pub cover: Option<String>,
}

/// Editable gallery fields
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoGroupInput {
    pub title: String,
    pub category: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub cover_thumb_url: Option<String>,
}

/// Editable schedule fields; the poster is uploaded separately
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub category: String,
    pub date: String,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub theme: String,
    pub description: Option<String>,
}

/// Creation or replacement payload for one content kind
#[derive(Debug, Clone)]
pub enum ContentInput {
    Article(ArticleInput),
    Video(VideoInput),
    Gallery(PhotoGroupInput),
    Schedule(ScheduleInput),
}

impl ContentInput {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentInput::Article(_) => ContentKind::Article,
            ContentInput::Video(_) => ContentKind::Video,
            ContentInput::Gallery(_) => ContentKind::Gallery,
            ContentInput::Schedule(_) => ContentKind::Schedule,
        }
    }

    /// Decode a JSON body as the input type for `kind`
    pub fn from_json(kind: ContentKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ContentKind::Article => ContentInput::Article(serde_json::from_value(value)?),
            ContentKind::Video => ContentInput::Video(serde_json::from_value(value)?),
            ContentKind::Gallery => ContentInput::Gallery(serde_json::from_value(value)?),
            ContentKind::Schedule => ContentInput::Schedule(serde_json::from_value(value)?),
        })
    }

    /// Check required fields; returns a message suitable for a 400 response
    pub fn validate(&self) -> Result<(), String> {
        fn required(field: &str, value: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("{} cannot be empty", field))
            } else {
                Ok(())
            }
        }

        match self {
            ContentInput::Article(i) => required("title", &i.title),
            ContentInput::Video(i) => {
                required("title", &i.title)?;
                required("bvid", &i.bvid)
            }
            ContentInput::Gallery(i) => required("title", &i.title),
            ContentInput::Schedule(i) => {
                required("category", &i.category)?;
                required("theme", &i.theme)?;
                NaiveDate::parse_from_str(&i.date, "%Y-%m-%d")
                    .map(|_| ())
                    .map_err(|_| format!("date must be YYYY-MM-DD, got '{}'", i.date))
            }
        }
    }
}

/// Listing filter shared by the review queue and "my content"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub kind: Option<ContentKind>,
    pub status: Option<ReviewStatus>,
    pub owner_id: Option<i64>,
}

impl ContentFilter {
    /// Kinds this filter reaches, in a stable order
    pub fn kinds(&self) -> Vec<ContentKind> {
        match self.kind {
            Some(kind) => vec![kind],
            None => ContentKind::ALL.to_vec(),
        }
    }
}

/// Per-kind status counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: i64,
    pub draft: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

impl StatusCounts {
    fn add(&mut self, status: ReviewStatus, n: i64) {
        self.total += n;
        match status {
            ReviewStatus::Draft => self.draft += n,
            ReviewStatus::Pending => self.pending += n,
            ReviewStatus::Approved => self.approved += n,
            ReviewStatus::Rejected => self.rejected += n,
        }
    }
}

/// Aggregate counts over all non-deleted content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewStatistics {
    #[serde(flatten)]
    pub overall: StatusCounts,
    pub by_type: BTreeMap<String, StatusCounts>,
}

impl ReviewStatistics {
    /// Fold `(kind, status, count)` rows; every kind appears even with no rows
    pub fn from_counts(rows: impl IntoIterator<Item = (ContentKind, ReviewStatus, i64)>) -> Self {
        let mut stats = Self {
            overall: StatusCounts::default(),
            by_type: ContentKind::ALL
                .iter()
                .map(|k| (k.as_str().to_string(), StatusCounts::default()))
                .collect(),
        };
        for (kind, status, n) in rows {
            stats.overall.add(status, n);
            stats
                .by_type
                .entry(kind.as_str().to_string())
                .or_default()
                .add(status, n);
        }
        stats
    }
}
