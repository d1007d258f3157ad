//! Admin audit log model
//!
//! One entry per successful moderation or account action. Entries are
//! append-only; only the retention purge removes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Actor, ContentKind, Role};

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Ban,
    Unban,
    RoleChange,
    Login,
    Logout,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Create => "create",
            LogAction::Update => "update",
            LogAction::Delete => "delete",
            LogAction::Approve => "approve",
            LogAction::Reject => "reject",
            LogAction::Ban => "ban",
            LogAction::Unban => "unban",
            LogAction::RoleChange => "role_change",
            LogAction::Login => "login",
            LogAction::Logout => "logout",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(LogAction::Create),
            "update" => Ok(LogAction::Update),
            "delete" => Ok(LogAction::Delete),
            "approve" => Ok(LogAction::Approve),
            "reject" => Ok(LogAction::Reject),
            "ban" => Ok(LogAction::Ban),
            "unban" => Ok(LogAction::Unban),
            "role_change" => Ok(LogAction::RoleChange),
            "login" => Ok(LogAction::Login),
            "logout" => Ok(LogAction::Logout),
            _ => Err(anyhow::anyhow!("Invalid log action: {}", s)),
        }
    }
}

/// What an entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogResourceType {
    Article,
    Video,
    Gallery,
    Schedule,
    User,
    System,
}

impl LogResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogResourceType::Article => "article",
            LogResourceType::Video => "video",
            LogResourceType::Gallery => "gallery",
            LogResourceType::Schedule => "schedule",
            LogResourceType::User => "user",
            LogResourceType::System => "system",
        }
    }
}

impl From<ContentKind> for LogResourceType {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Article => LogResourceType::Article,
            ContentKind::Video => LogResourceType::Video,
            ContentKind::Gallery => LogResourceType::Gallery,
            ContentKind::Schedule => LogResourceType::Schedule,
        }
    }
}

impl fmt::Display for LogResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogResourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(LogResourceType::Article),
            "video" => Ok(LogResourceType::Video),
            "gallery" => Ok(LogResourceType::Gallery),
            "schedule" => Ok(LogResourceType::Schedule),
            "user" => Ok(LogResourceType::User),
            "system" => Ok(LogResourceType::System),
            _ => Err(anyhow::anyhow!("Invalid resource type: {}", s)),
        }
    }
}

/// A persisted audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    pub id: String,
    pub action: LogAction,
    pub resource_type: LogResourceType,
    pub resource_id: Option<String>,
    pub operator_id: i64,
    pub operator_username: String,
    pub operator_role: Role,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdminLogEntry {
    pub fn new(
        actor: &Actor,
        action: LogAction,
        resource_type: LogResourceType,
        resource_id: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            resource_type,
            resource_id,
            operator_id: actor.id,
            operator_username: actor.username.clone(),
            operator_role: actor.role,
            description: description.into(),
            details: None,
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

/// Filters for browsing the log
#[derive(Debug, Clone, Default)]
pub struct AdminLogFilter {
    pub action: Option<LogAction>,
    pub resource_type: Option<LogResourceType>,
    pub operator_id: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
