//! Transport layer for the batched command endpoint
//!
//! A transport posts one JSON payload and hands back the raw response body.
//! Retrying, normalization and session bookkeeping happen in the client on
//! top of this trait, so every transport gets the same semantics:
//! - [`HttpTransport`] talks to the real endpoint with reqwest
//! - [`MockTransport`] replays scripted replies for tests

mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Transport-agnostic interface for posting a command batch
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a payload and return the decoded response body
    ///
    /// Returns `Ok(None)` when the server answered with an empty or `null`
    /// body.
    async fn post(&self, payload: &Value) -> Result<Option<Value>, TransportError>;
}

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Server error {status}")]
    ServerError { status: u16 },

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl TransportError {
    /// Network-level failure worth another attempt
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::ProtocolError(_))
    }
}
