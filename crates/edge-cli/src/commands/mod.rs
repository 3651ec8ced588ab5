//! Command implementations for edgebulk

pub mod auth;
pub mod bulk;
pub mod onboard;
pub mod query;

pub use auth::{login, logout, switch_org, verify};
pub use bulk::{change_def, delete, profile, settings, tags, undeploy};
pub use onboard::onboard;
pub use query::query;
