//! Edge Client Library
//!
//! Client for a device-management backend that is only reachable through a
//! batched command protocol: one HTTP POST carries a session envelope plus
//! any number of labeled commands, and the answer echoes a result per label.
//!
//! # Example
//!
//! ```rust,no_run
//! use edge_client::{commands, EdgeClient, LoginOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = EdgeClient::new("https://api-de.devicewise.com/api")?;
//!
//!     if client.authenticate("ops@example.com", "secret").await? == LoginOutcome::MfaRequired {
//!         client.submit_mfa("123456").await?;
//!     }
//!
//!     // Tag two devices in one round trip
//!     let devices = ["352656100000001", "352656100000002"];
//!     let result = client.run_commands(commands::tag_add(&devices, &["pilot"])).await?;
//!     for (label, entry) in result.failures() {
//!         eprintln!("command {} failed: {}", label, entry.error_summary());
//!     }
//!
//!     // Page through every thing
//!     let things = client
//!         .run_iterated_command(edge_client::Command::new("thing.list"))
//!         .await?;
//!     println!("{} things", things.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an in-process backend for integration tests:
//!
//! ```rust,ignore
//! use edge_client::testing::{ok_entry, FakeBackend, TestServer};
//!
//! let backend = FakeBackend::new();
//! backend.on_fixed("session.info", ok_entry(json!({})));
//! let server = TestServer::start(backend.router()).await?;
//! server.client.restore_session("token");
//! assert!(server.client.is_authenticated().await);
//! ```

mod catalog;
mod client;
pub mod commands;
pub mod config;
mod error;
pub mod onboarding;
mod query;
pub mod session;
pub mod testing;
pub mod transport;
mod types;

pub use client::{EdgeClient, LoginOutcome};
pub use commands::{BuildError, DeleteSelector};
pub use config::{ClientConfig, ConfigError};
pub use error::{EdgeClientError, Result};
pub use onboarding::{
    DeviceOutcome, OnboardedThing, OnboardingError, OnboardingPlan, OnboardingReport,
    OnboardingStep,
};
pub use session::{AuthState, MFA_REQUIRED_CODE};
pub use types::*;
