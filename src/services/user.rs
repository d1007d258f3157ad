//! User service
//!
//! Accounts, sessions and the two staff-only account actions:
//! - registration (the first account becomes `super_admin`)
//! - login/logout with opaque session tokens
//! - role changes and bans, each committed together with its audit entry
//!
//! Logins and logouts of staff accounts are audited as well.

use crate::db::repositories::{tx, SessionRepository, UserRepository};
use crate::db::DynDatabasePool;
use crate::models::{
    Actor, AdminLogEntry, ListParams, LogAction, LogResourceType, PagedResult, Role, Session, User,
    UserStatus,
};
use crate::services::audit::{self, AuditLogger};
use crate::services::password::{hash_password, verify_password};
use crate::services::permissions::{has_permission, PermissionPolicy};
use anyhow::Context;
use serde_json::json;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Account is banned")]
    Banned,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Permission denied")]
    Forbidden,

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    pool: DynDatabasePool,
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    audit: Arc<AuditLogger>,
    policy: PermissionPolicy,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        pool: DynDatabasePool,
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            pool,
            user_repo,
            session_repo,
            audit,
            policy: PermissionPolicy::default(),
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    pub fn with_policy(mut self, policy: PermissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a new account.
    ///
    /// The very first account becomes `super_admin`; every later one is a
    /// plain `user`.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self.user_repo.get_by_username(&input.username).await?.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }
        if self.user_repo.get_by_email(&input.email).await?.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let role = if self.is_first_user().await? {
            Role::SuperAdmin
        } else {
            Role::User
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, input.email, password_hash, role);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} ({}) as {}", created.username, created.id, created.role);
        Ok(created)
    }

    /// Verify credentials and open a session
    pub async fn login(&self, input: LoginInput, ip: Option<String>) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        if user.is_banned() {
            return Err(UserServiceError::Banned);
        }

        let session = Session::issue(user.id, self.session_expiration_days);
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        if has_permission(user.role, Role::Admin) {
            let entry = AdminLogEntry::new(
                &user.actor(),
                LogAction::Login,
                LogResourceType::System,
                None,
                format!("{} logged in", user.username),
            )
            .with_ip(ip);
            self.audit.record_standalone(entry).await?;
        }

        Ok(session)
    }

    /// Invalidate a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str, ip: Option<String>) -> Result<(), UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(session_id).await? else {
            return Ok(());
        };

        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        if let Some(user) = self.user_repo.get_by_id(session.user_id).await? {
            if has_permission(user.role, Role::Admin) {
                let entry = AdminLogEntry::new(
                    &user.actor(),
                    LogAction::Logout,
                    LogResourceType::System,
                    None,
                    format!("{} logged out", user.username),
                )
                .with_ip(ip);
                self.audit.record_standalone(entry).await?;
            }
        }
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Unknown or expired tokens give `Ok(None)`; expired ones are deleted on
    /// the way. A banned account is an error so callers can say so.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        match self.user_repo.get_by_id(session.user_id).await? {
            Some(user) if user.is_banned() => Err(UserServiceError::Banned),
            other => Ok(other),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Account listing for staff
    pub async fn list_users(&self, actor: &Actor, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        if !has_permission(actor.role, Role::Admin) {
            return Err(UserServiceError::Forbidden);
        }
        let total = self.user_repo.count().await?;
        let items = self.user_repo.list(params.offset(), params.limit()).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Change another account's role (super admin only)
    pub async fn change_role(
        &self,
        actor: &Actor,
        target_id: i64,
        role: Role,
        ip: Option<String>,
    ) -> Result<User, UserServiceError> {
        if !self.policy.can_change_role(actor, target_id) {
            return Err(UserServiceError::Forbidden);
        }
        let target = self
            .user_repo
            .get_by_id(target_id)
            .await?
            .ok_or(UserServiceError::NotFound(target_id))?;
        if target.role == role {
            return Ok(target);
        }

        let mut tx = tx::begin(&self.pool).await?;
        if !tx.update_user_access(target.id, role, target.status).await? {
            return Err(UserServiceError::NotFound(target_id));
        }
        let entry = AdminLogEntry::new(
            actor,
            LogAction::RoleChange,
            LogResourceType::User,
            Some(target.id.to_string()),
            format!("Changed role of {} from {} to {}", target.username, target.role, role),
        )
        .with_details(json!({ "old_role": target.role, "new_role": role }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(
            operator = actor.id,
            target = target.id,
            "Role changed from {} to {}",
            target.role,
            role
        );
        Ok(User { role, ..target })
    }

    /// Ban or unban an account. Banning also revokes every open session.
    pub async fn set_banned(
        &self,
        actor: &Actor,
        target_id: i64,
        banned: bool,
        reason: Option<String>,
        ip: Option<String>,
    ) -> Result<User, UserServiceError> {
        if !has_permission(actor.role, Role::Admin) {
            return Err(UserServiceError::Forbidden);
        }
        let target = self
            .user_repo
            .get_by_id(target_id)
            .await?
            .ok_or(UserServiceError::NotFound(target_id))?;
        if !self.policy.can_ban_user(actor, &target) {
            return Err(UserServiceError::Forbidden);
        }

        let (status, action, verb) = if banned {
            (UserStatus::Banned, LogAction::Ban, "Banned")
        } else {
            (UserStatus::Active, LogAction::Unban, "Unbanned")
        };

        let mut tx = tx::begin(&self.pool).await?;
        if !tx.update_user_access(target.id, target.role, status).await? {
            return Err(UserServiceError::NotFound(target_id));
        }
        let revoked = if banned {
            tx.delete_user_sessions(target.id).await?
        } else {
            0
        };
        let entry = AdminLogEntry::new(
            actor,
            action,
            LogResourceType::User,
            Some(target.id.to_string()),
            format!("{} {}", verb, target.username),
        )
        .with_details(json!({ "reason": reason, "revoked_sessions": revoked }))
        .with_ip(ip);
        audit::record(tx.as_mut(), entry).await?;
        tx.commit().await?;

        tracing::info!(operator = actor.id, target = target.id, "{} user", verb);
        Ok(User { status, ..target })
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self.user_repo.get_by_username(username_or_email).await? {
            return Ok(Some(user));
        }
        Ok(self.user_repo.get_by_email(username_or_email).await?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(UserServiceError::ValidationError("Username cannot be empty".to_string()));
    }
    if username.chars().count() > 50 {
        return Err(UserServiceError::ValidationError(
            "Username must be at most 50 characters".to_string(),
        ));
    }
    if input.email.trim().is_empty() {
        return Err(UserServiceError::ValidationError("Email cannot be empty".to_string()));
    }
    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
    }
    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError("Password cannot be empty".to_string()));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
