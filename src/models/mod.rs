//! Data models
//!
//! This module contains the data structures used throughout Fanpress:
//! - Accounts and sessions (User, Role, Session, Actor)
//! - Reviewable content (Article, Video, PhotoGroup, Schedule)
//! - Audit log entries
//! - Pagination types

mod admin_log;
mod content;
mod pagination;
mod session;
mod user;

pub use admin_log::{AdminLogEntry, AdminLogFilter, LogAction, LogResourceType};
pub use content::{
    Article, ArticleInput, Content, ContentFilter, ContentId, ContentInput, ContentKind,
    ContentMeta, PhotoGroup, PhotoGroupInput, ReviewFields, ReviewStatistics, ReviewStatus,
    Reviewable, Schedule, ScheduleInput, StatusCounts, Video, VideoInput,
};
pub use pagination::{ListParams, PagedResult};
pub use session::Session;
pub use user::{Actor, Role, User, UserStatus};
