//! Mock transport for testing

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Transport, TransportError};

/// A single scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with this JSON body
    Body(Value),
    /// Respond with an empty body
    Empty,
    /// Fail at the transport level
    Error(TransportError),
}

type Handler = Arc<dyn Fn(&Value) -> MockReply + Send + Sync>;

/// Replays scripted replies in order and records every payload it receives
///
/// Once the script runs dry the optional handler answers; without one the
/// mock fails with a connection error.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<Value>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> MockReply + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    /// Queue a reply
    pub fn push(&self, reply: MockReply) -> &Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Queue a JSON body
    pub fn push_body(&self, body: Value) -> &Self {
        self.push(MockReply::Body(body))
    }

    /// Queue a transient connection failure
    pub fn push_connection_error(&self) -> &Self {
        self.push(MockReply::Error(TransportError::ConnectionFailed(
            "connection refused".into(),
        )))
    }

    /// Every payload posted so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, payload: &Value) -> Result<Option<Value>, TransportError> {
        self.requests.lock().push(payload.clone());

        let scripted = self.script.lock().pop_front();
        let reply = match (scripted, &self.handler) {
            (Some(reply), _) => reply,
            (None, Some(handler)) => handler(payload),
            (None, None) => MockReply::Error(TransportError::ConnectionFailed(
                "no scripted reply".into(),
            )),
        };

        match reply {
            MockReply::Body(body) => Ok(Some(body)),
            MockReply::Empty => Ok(None),
            MockReply::Error(err) => Err(err),
        }
    }
}
