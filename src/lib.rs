//! Fanpress - moderated publishing backend for a fan community site
//!
//! Community members publish articles, videos, photo galleries and tour
//! schedules; staff review them before they go live.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
