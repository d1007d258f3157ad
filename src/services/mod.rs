//! Services layer - Business logic
//!
//! Services own the moderation rules:
//! - role hierarchy and permission predicates
//! - the review-status state machine and its owner/reviewer operations
//! - publish-time side effects and object storage
//! - the audit log and account management

pub mod audit;
pub mod content;
pub mod error;
pub mod lifecycle;
pub mod password;
pub mod permissions;
pub mod publish;
pub mod review;
pub mod storage;
pub mod user;

pub use audit::AuditLogger;
pub use content::{generate_slug, ContentService};
pub use error::ModerationError;
pub use lifecycle::{LifecycleEvent, ReviewDecision};
pub use password::{hash_password, verify_password};
pub use permissions::{has_permission, rank, PermissionPolicy};
pub use publish::{PublishArtifact, PublishSideEffect, SchedulePosterPublisher};
pub use review::{ReviewCoordinator, ReviewItem};
pub use storage::{DynObjectStorage, LocalObjectStorage, ObjectStorage, StorageError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
