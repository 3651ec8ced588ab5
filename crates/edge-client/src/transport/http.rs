//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{Transport, TransportError};
use crate::config::TimeoutsConfig;
use crate::error::Result;

/// Posts batches to the endpoint over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport for `endpoint` with the given timeouts
    pub fn new(endpoint: &str, timeouts: &TimeoutsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeouts.request_ms))
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .build()?;

        let endpoint = Url::parse(endpoint)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, payload: &Value) -> std::result::Result<Option<Value>, TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(payload)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        debug!(%status, bytes = body.len(), "Received batch response");

        if body.iter().all(u8::is_ascii_whitespace) {
            if status.is_server_error() {
                return Err(TransportError::ServerError {
                    status: status.as_u16(),
                });
            }
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            // Gateways in front of the API answer outages with HTML error pages
            Err(_) if status.is_server_error() => Err(TransportError::ServerError {
                status: status.as_u16(),
            }),
            Err(e) => Err(TransportError::ProtocolError(format!(
                "HTTP {} with non-JSON body: {}",
                status, e
            ))),
        }
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_decode() {
        TransportError::ProtocolError(err.to_string())
    } else {
        TransportError::ConnectionFailed(err.to_string())
    }
}
