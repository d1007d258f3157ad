//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use std::str::FromStr;

use crate::api::middleware::ApiError;
use crate::models::{ContentId, ContentKind, ListParams};

// ============================================================================
// Pagination Defaults
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for listing APIs
pub fn default_per_page() -> u32 {
    20
}

pub fn list_params(page: u32, per_page: u32) -> ListParams {
    ListParams::new(page, per_page)
}

// ============================================================================
// Path and query parsing
// ============================================================================

/// Resolve `{kind}/{id}` path segments. An unknown kind or an id of the
/// wrong shape reads as a missing resource.
pub fn parse_target(kind: &str, id: &str) -> Result<(ContentKind, ContentId), ApiError> {
    let kind = ContentKind::from_str(kind)
        .map_err(|_| ApiError::not_found(format!("Unknown content type: {}", kind)))?;
    let id = kind
        .parse_id(id)
        .ok_or_else(|| ApiError::not_found(format!("{} not found: {}", kind, id)))?;
    Ok((kind, id))
}

pub fn parse_kind(kind: &str) -> Result<ContentKind, ApiError> {
    ContentKind::from_str(kind).map_err(|_| ApiError::not_found(format!("Unknown content type: {}", kind)))
}

/// Optional query filter; empty strings count as absent
pub fn parse_filter<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => T::from_str(v)
            .map(Some)
            .map_err(|_| ApiError::validation_error(format!("Invalid {}: {}", name, v))),
        None => Ok(None),
    }
}
