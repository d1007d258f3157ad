//! Review state machine
//!
//! ```text
//! draft ──submit──▶ pending ──approve──▶ approved
//!                    ▲   │
//!               submit   reject
//!                    │   ▼
//!                  rejected
//! ```
//!
//! Approval and rejection are accepted only from `pending`. Review fields
//! survive a resubmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ModerationError;
use crate::models::{Actor, ReviewFields, ReviewStatus, Reviewable};

/// Something that moves content between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Submit,
    Approve,
    Reject,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Submit => "submit",
            LifecycleEvent::Approve => "approve",
            LifecycleEvent::Reject => "reject",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn event(self) -> LifecycleEvent {
        match self {
            ReviewDecision::Approve => LifecycleEvent::Approve,
            ReviewDecision::Reject => LifecycleEvent::Reject,
        }
    }
}

/// Next state for `event`, or an `InvalidTransition` error
pub fn transition(from: ReviewStatus, event: LifecycleEvent) -> Result<ReviewStatus, ModerationError> {
    use LifecycleEvent::*;
    use ReviewStatus::*;

    match (from, event) {
        (Draft | Rejected, Submit) => Ok(Pending),
        (Pending, Approve) => Ok(Approved),
        (Pending, Reject) => Ok(Rejected),
        (from, event) => Err(ModerationError::InvalidTransition {
            from,
            action: event.as_str(),
        }),
    }
}

/// Status for newly created content; only draft or pending may be requested
pub fn initial_status(requested: Option<ReviewStatus>) -> Result<ReviewStatus, ModerationError> {
    match requested {
        None | Some(ReviewStatus::Draft) => Ok(ReviewStatus::Draft),
        Some(ReviewStatus::Pending) => Ok(ReviewStatus::Pending),
        Some(other) => Err(ModerationError::ValidationError(format!(
            "New content cannot start as {}",
            other
        ))),
    }
}

/// Trimmed notes, `None` when blank
pub fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Apply a review verdict in memory.
///
/// Checks the transition first, then the rejection-notes requirement.
/// Nothing on `content` changes when either check fails.
pub fn apply_review(
    content: &mut dyn Reviewable,
    decision: ReviewDecision,
    reviewer: &Actor,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ReviewStatus, ModerationError> {
    let next = transition(content.get_status(), decision.event())?;
    let notes = normalize_notes(notes);

    if decision == ReviewDecision::Reject && notes.is_none() {
        return Err(ModerationError::ValidationError(
            "Review notes are required when rejecting".to_string(),
        ));
    }

    content.set_status(next);
    content.set_reviewer_fields(ReviewFields {
        reviewer_id: Some(reviewer.id),
        review_notes: notes,
        reviewed_at: Some(now),
    });
    content.meta_mut().updated_at = now;
    Ok(next)
}

/// Move draft or rejected content into the review queue
pub fn submit(content: &mut dyn Reviewable, now: DateTime<Utc>) -> Result<ReviewStatus, ModerationError> {
    let next = transition(content.get_status(), LifecycleEvent::Submit)?;
    content.set_status(next);
    content.meta_mut().updated_at = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, ContentInput, PhotoGroupInput, Role};

    fn gallery(status: ReviewStatus) -> Content {
        let input = ContentInput::Gallery(PhotoGroupInput {
            title: "Live shots".into(),
            category: None,
            date: None,
            description: None,
            cover_image_url: None,
            cover_thumb_url: None,
        });
        Content::from_input(input, &Actor::new(7, "fan", Role::User), status, Utc::now())
    }

    fn reviewer() -> Actor {
        Actor::new(1, "mod", Role::Admin)
    }

    #[test]
    fn test_transition_table() {
        use LifecycleEvent::*;
        use ReviewStatus::*;

        assert_eq!(transition(Draft, Submit).unwrap(), Pending);
        assert_eq!(transition(Rejected, Submit).unwrap(), Pending);
        assert_eq!(transition(Pending, Approve).unwrap(), Approved);
        assert_eq!(transition(Pending, Reject).unwrap(), Rejected);

        assert!(transition(Pending, Submit).is_err());
        assert!(transition(Approved, Submit).is_err());
        assert!(transition(Draft, Approve).is_err());
        assert!(transition(Approved, Reject).is_err());
    }

    #[test]
    fn test_invalid_transition_reports_state() {
        match transition(ReviewStatus::Approved, LifecycleEvent::Approve) {
            Err(ModerationError::InvalidTransition { from, action }) => {
                assert_eq!(from, ReviewStatus::Approved);
                assert_eq!(action, "approve");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(initial_status(None).unwrap(), ReviewStatus::Draft);
        assert_eq!(initial_status(Some(ReviewStatus::Pending)).unwrap(), ReviewStatus::Pending);
        assert!(matches!(
            initial_status(Some(ReviewStatus::Approved)),
            Err(ModerationError::ValidationError(_))
        ));
        assert!(initial_status(Some(ReviewStatus::Rejected)).is_err());
    }

    #[test]
    fn test_approve_sets_reviewer_fields() {
        let mut content = gallery(ReviewStatus::Pending);
        let now = Utc::now();

        let next = apply_review(content.as_reviewable_mut(), ReviewDecision::Approve, &reviewer(), None, now).unwrap();

        assert_eq!(next, ReviewStatus::Approved);
        let fields = content.meta().review.clone();
        assert_eq!(fields.reviewer_id, Some(1));
        assert_eq!(fields.review_notes, None);
        assert_eq!(fields.reviewed_at, Some(now));
        assert!(content.is_published());
    }

    #[test]
    fn test_reject_requires_notes() {
        let mut content = gallery(ReviewStatus::Pending);

        for blank in [None, Some(""), Some("   ")] {
            let err = apply_review(content.as_reviewable_mut(), ReviewDecision::Reject, &reviewer(), blank, Utc::now())
                .unwrap_err();
            assert!(matches!(err, ModerationError::ValidationError(_)));
        }
        assert_eq!(content.status(), ReviewStatus::Pending);
        assert_eq!(content.meta().review, ReviewFields::default());

        apply_review(content.as_reviewable_mut(), ReviewDecision::Reject, &reviewer(), Some("  blurry "), Utc::now())
            .unwrap();
        assert_eq!(content.status(), ReviewStatus::Rejected);
        assert_eq!(content.meta().review.review_notes.as_deref(), Some("blurry"));
    }

    #[test]
    fn test_resubmit_keeps_review_fields() {
        let mut content = gallery(ReviewStatus::Pending);
        apply_review(content.as_reviewable_mut(), ReviewDecision::Reject, &reviewer(), Some("fix"), Utc::now())
            .unwrap();

        submit(content.as_reviewable_mut(), Utc::now()).unwrap();

        assert_eq!(content.status(), ReviewStatus::Pending);
        assert_eq!(content.meta().review.review_notes.as_deref(), Some("fix"));
    }

    #[test]
    fn test_transition_error_checked_before_notes() {
        let mut content = gallery(ReviewStatus::Draft);
        let err = apply_review(content.as_reviewable_mut(), ReviewDecision::Reject, &reviewer(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidTransition { .. }));
    }
}
