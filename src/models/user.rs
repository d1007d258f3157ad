//! User model
//!
//! Registered accounts, their moderation role and their account status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Moderation role
    pub role: Role,
    /// User status (active/banned)
    pub status: UserStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// The password must already be hashed with `services::password::hash_password()`.
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is banned
    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    /// The identity this user acts under for permission checks
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Actor role, totally ordered by rank.
///
/// `Guest < User < Admin < SuperAdmin`. The derived `Ord` follows the
/// declaration order, which matches `rank()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Anonymous or unrecognised actor
    Guest,
    /// Registered contributor
    #[default]
    User,
    /// Reviewer and editor
    Admin,
    /// Full control including user management
    SuperAdmin,
}

impl Role {
    /// All roles in ascending rank
    pub const ALL: [Role; 4] = [Role::Guest, Role::User, Role::Admin, Role::SuperAdmin];

    /// Ordinal used for hierarchy comparisons
    pub fn rank(self) -> u8 {
        match self {
            Role::Guest => 0,
            Role::User => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Decode a role read from storage.
    ///
    /// Unrecognised values decode as `Guest` so the account fails every
    /// permission check above guest level.
    pub fn parse_stored(s: &str) -> Self {
        match s.parse() {
            Ok(role) => role,
            Err(_) => {
                tracing::warn!("Unknown role '{}' in storage, treating as guest", s);
                Role::Guest
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// User status for account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Normal access
    #[default]
    Active,
    /// Cannot login
    Banned,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Banned => write!(f, "banned"),
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

/// The authenticated identity behind a request.
///
/// Immutable for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "testuser".to_string(),
            "test@example.com".to_string(),
            "hashed_password".to_string(),
            Role::User,
        );

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "testuser");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.status, UserStatus::Active);
        assert!(!user.is_banned());
    }

    #[test]
    fn test_user_actor() {
        let mut user = User::new("mod".into(), "m@x.com".into(), "h".into(), Role::Admin);
        user.id = 42;

        assert_eq!(user.actor(), Actor::new(42, "mod", Role::Admin));
    }

    #[test]
    fn test_role_rank_order() {
        assert_eq!(Role::Guest.rank(), 0);
        assert_eq!(Role::User.rank(), 1);
        assert_eq!(Role::Admin.rank(), 2);
        assert_eq!(Role::SuperAdmin.rank(), 3);
        assert!(Role::Guest < Role::User && Role::User < Role::Admin && Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn test_role_display_and_parse() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
            assert_eq!(role.to_string(), role.as_str());
        }
        assert_eq!(Role::from_str("SUPER_ADMIN").unwrap(), Role::SuperAdmin);
        assert!(Role::from_str("editor").is_err());
    }

    #[test]
    fn test_role_parse_stored_unknown_is_guest() {
        assert_eq!(Role::parse_stored("admin"), Role::Admin);
        assert_eq!(Role::parse_stored("moderator"), Role::Guest);
        assert_eq!(Role::parse_stored(""), Role::Guest);
    }

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
        let parsed: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, Role::Admin);
    }

    #[test]
    fn test_user_status_round_trip() {
        assert_eq!(UserStatus::from_str("Banned").unwrap(), UserStatus::Banned);
        assert_eq!(UserStatus::Active.to_string(), "active");
        assert!(UserStatus::from_str("frozen").is_err());
    }
}
