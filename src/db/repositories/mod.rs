//! Database repositories
//!
//! One repository per aggregate, each with a trait and an SQLx
//! implementation covering SQLite and MySQL. Writes that must be audited
//! go through [`WriteTx`].

pub mod admin_log;
pub mod content;
pub mod session;
pub mod tx;
pub mod user;

pub use admin_log::{AdminLogRepository, SqlxAdminLogRepository};
pub use content::{ContentRepository, SqlxContentRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tx::WriteTx;
pub use user::{SqlxUserRepository, UserRepository};
