//! Test utilities for edge-client
//!
//! [`FakeBackend`] speaks the batched command protocol over HTTP and
//! [`TestServer`] runs it (or any axum router) on a local port with a client
//! pointed at it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::types::AUTH_LABEL;
use crate::{EdgeClient, Result};

/// Path the fake backend serves the batched endpoint on
pub const API_PATH: &str = "/api";

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: EdgeClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` and create a client for it with every delay zeroed
    ///
    /// # Example
    ///
    /// ```ignore
    /// use edge_client::testing::{FakeBackend, TestServer};
    ///
    /// let backend = FakeBackend::new();
    /// let server = TestServer::start(backend.router()).await?;
    /// let state = server.client.verify_auth_state().await?;
    /// ```
    pub async fn start(router: axum::Router) -> Result<Self> {
        Self::start_with(router, |builder| builder).await
    }

    /// Serve `router` and create a client with a customized configuration
    pub async fn start_with<F>(router: axum::Router, configure: F) -> Result<Self>
    where
        F: FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let builder = ClientConfig::builder(format!("http://{}{}", addr, API_PATH))
            .no_delays()
            .request_timeout_ms(5_000)
            .connect_timeout_ms(2_000);
        let client = EdgeClient::with_config(configure(builder).build())?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// URL of the batched endpoint
    pub fn endpoint_url(&self) -> String {
        format!("http://{}{}", self.addr, API_PATH)
    }

    /// Get a reference to the client
    pub fn client(&self) -> &EdgeClient {
        &self.client
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Fake backend
// =============================================================================

/// Answers one command: receives its params and the request's session id,
/// returns the per-label result entry
pub type CommandHandler = Arc<dyn Fn(&Value, Option<&str>) -> Value + Send + Sync>;

/// Successful result entry
pub fn ok_entry(params: Value) -> Value {
    json!({ "success": true, "params": params })
}

/// Failed result entry
pub fn failed_entry(error_codes: &[i64]) -> Value {
    json!({ "success": false, "errorCodes": error_codes })
}

#[derive(Default)]
struct FakeBackendInner {
    handlers: RwLock<HashMap<String, CommandHandler>>,
    raw_reply: RwLock<Option<(StatusCode, String)>>,
    requests: Mutex<Vec<Value>>,
}

/// In-process backend speaking the batched command protocol
///
/// Each labeled command (including a login under `auth`) is dispatched to the
/// handler registered for its name. Unknown commands fail with code `-1`.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<FakeBackendInner>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a command name
    pub fn on<F>(&self, command: &str, handler: F) -> &Self
    where
        F: Fn(&Value, Option<&str>) -> Value + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .insert(command.to_string(), Arc::new(handler));
        self
    }

    /// Answer `command` with a fixed entry
    pub fn on_fixed(&self, command: &str, entry: Value) -> &Self {
        self.on(command, move |_, _| entry.clone())
    }

    /// Accept `password` for `username` and issue `session_id`
    pub fn with_login(&self, username: &str, password: &str, session_id: &str) -> &Self {
        let (username, password, session_id) =
            (username.to_string(), password.to_string(), session_id.to_string());
        self.on("api.authenticate", move |params, _| {
            if params["username"] == username.as_str() && params["password"] == password.as_str() {
                ok_entry(json!({ "sessionId": session_id }))
            } else {
                failed_entry(&[-90001])
            }
        })
    }

    /// Answer every request with a raw status and body, bypassing dispatch
    pub fn respond_raw(&self, status: StatusCode, body: impl Into<String>) -> &Self {
        *self.inner.raw_reply.write() = Some((status, body.into()));
        self
    }

    /// Go back to normal dispatch
    pub fn clear_raw(&self) -> &Self {
        *self.inner.raw_reply.write() = None;
        self
    }

    /// Every request payload received so far
    pub fn requests(&self) -> Vec<Value> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Names of every command received, in order
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .requests
            .lock()
            .iter()
            .flat_map(|payload| {
                payload
                    .as_object()
                    .into_iter()
                    .flat_map(|entries| entries.values())
                    .filter_map(|entry| entry.get("command").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Axum router serving the batched endpoint
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route(API_PATH, post(handle_batch))
            .with_state(self.clone())
    }

    fn dispatch(&self, payload: &Value) -> Value {
        let Some(entries) = payload.as_object() else {
            return json!({ "success": false, "errorCodes": [-2] });
        };

        let session_id = entries
            .get(AUTH_LABEL)
            .and_then(|auth| auth.get("sessionId"))
            .and_then(Value::as_str);

        let handlers = self.inner.handlers.read();
        let mut response = Map::new();
        response.insert("success".to_string(), Value::Bool(true));
        for (label, entry) in entries {
            let Some(command) = entry.get("command").and_then(Value::as_str) else {
                continue;
            };
            let params = entry.get("params").cloned().unwrap_or_else(|| json!({}));
            let result = match handlers.get(command) {
                Some(handler) => handler(&params, session_id),
                None => failed_entry(&[-1]),
            };
            response.insert(label.clone(), result);
        }
        Value::Object(response)
    }
}

async fn handle_batch(State(backend): State<FakeBackend>, body: String) -> Response {
    let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    backend.inner.requests.lock().push(payload.clone());

    let raw = backend.inner.raw_reply.read().clone();
    if let Some((status, body)) = raw {
        return (status, body).into_response();
    }

    axum::Json(backend.dispatch(&payload)).into_response()
}
