//! Role hierarchy and permission predicates
//!
//! Every predicate is a pure function of its inputs. The category
//! allow-lists and the two approved-content switches come from
//! [`ModerationConfig`] through [`PermissionPolicy`].

use std::collections::HashSet;

use crate::config::ModerationConfig;
use crate::models::{Actor, ContentKind, Reviewable, ReviewStatus, Role, User};

/// Hierarchy rank of a role
pub fn rank(role: Role) -> u8 {
    role.rank()
}

/// `actual` is at least as privileged as `required`
pub fn has_permission(actual: Role, required: Role) -> bool {
    rank(actual) >= rank(required)
}

/// Injectable permission policy
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    admin_categories: HashSet<String>,
    user_categories: HashSet<String>,
    requeue_approved_on_owner_edit: bool,
    owner_can_delete_published: bool,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::from_config(&ModerationConfig::default())
    }
}

impl PermissionPolicy {
    pub fn from_config(config: &ModerationConfig) -> Self {
        Self {
            admin_categories: config.admin_categories.iter().cloned().collect(),
            user_categories: config.user_categories.iter().cloned().collect(),
            requeue_approved_on_owner_edit: config.requeue_approved_on_owner_edit,
            owner_can_delete_published: config.owner_can_delete_published,
        }
    }

    /// Guests never create; schedules need admin, everything else user
    pub fn can_create_content(&self, kind: ContentKind, actor: &Actor) -> bool {
        let required = match kind {
            ContentKind::Schedule => Role::Admin,
            _ => Role::User,
        };
        has_permission(actor.role, required)
    }

    pub fn can_publish_category(&self, actor: &Actor, category_primary: &str) -> bool {
        match actor.role {
            Role::SuperAdmin => true,
            Role::Admin => self.admin_categories.contains(category_primary),
            Role::User => self.user_categories.contains(category_primary),
            Role::Guest => false,
        }
    }

    /// Owners may edit their live content in any review state; staff may edit anything
    pub fn can_edit_content(&self, content: &dyn Reviewable, actor: &Actor) -> bool {
        if has_permission(actor.role, Role::Admin) {
            return true;
        }
        is_live_owner(content, actor)
    }

    /// Super admins delete anything. Owners delete their own content,
    /// including approved items unless the policy forbids it.
    pub fn can_delete_content(&self, content: &dyn Reviewable, actor: &Actor) -> bool {
        if has_permission(actor.role, Role::SuperAdmin) {
            return true;
        }
        if !is_live_owner(content, actor) {
            return false;
        }
        content.get_status() != ReviewStatus::Approved || self.owner_can_delete_published
    }

    pub fn can_review(&self, actor: &Actor) -> bool {
        has_permission(actor.role, Role::Admin)
    }

    pub fn can_manage_users(&self, actor: &Actor) -> bool {
        has_permission(actor.role, Role::SuperAdmin)
    }

    /// Role changes: super admin only, never on oneself
    pub fn can_change_role(&self, actor: &Actor, target_id: i64) -> bool {
        self.can_manage_users(actor) && actor.id != target_id
    }

    /// Bans and unbans: admin+, never oneself, and an admin cannot act on
    /// another admin or a super admin
    pub fn can_ban_user(&self, actor: &Actor, target: &User) -> bool {
        if actor.id == target.id || !has_permission(actor.role, Role::Admin) {
            return false;
        }
        if actor.role == Role::Admin && has_permission(target.role, Role::Admin) {
            return false;
        }
        true
    }

    /// Whether an edit by `actor` sends approved content back to review
    pub fn requeues_on_edit(&self, content: &dyn Reviewable, actor: &Actor) -> bool {
        self.requeue_approved_on_owner_edit
            && content.get_status() == ReviewStatus::Approved
            && !has_permission(actor.role, Role::Admin)
            && content.get_owner() == Some(actor.id)
    }
}

/// Owner check shared by edit and delete; the owner must still hold at
/// least user rank and the item must not be tombstoned
fn is_live_owner(content: &dyn Reviewable, actor: &Actor) -> bool {
    has_permission(actor.role, Role::User)
        && !content.meta().is_deleted
        && content.get_owner() == Some(actor.id)
}
