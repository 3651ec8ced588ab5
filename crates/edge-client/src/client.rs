//! Edge API client implementation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{EdgeClientError, Result};
use crate::session::{AuthState, Session, DEFAULT_SESSION_TTL_SECS, MFA_REQUIRED_CODE};
use crate::transport::{HttpTransport, Transport};
use crate::types::{command_value, BatchResult, Command, CommandBatch, CommandResult, AUTH_LABEL};

/// Outcome of a login round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A session token was issued
    Authenticated,
    /// Password accepted, a one-time code must follow via [`EdgeClient::submit_mfa`]
    MfaRequired,
}

/// Client for the batched command endpoint
///
/// One instance holds one session. Create one client per logical user
/// session and never share it between users.
pub struct EdgeClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    session: RwLock<Session>,
}

impl EdgeClient {
    /// Create a new client for the given endpoint with default settings
    ///
    /// # Arguments
    /// * `endpoint_url` - URL of the batched command endpoint
    ///   (e.g., "https://api-de.devicewise.com/api")
    pub fn new(endpoint_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::builder(endpoint_url).build())
    }

    /// Create a new client over HTTP with custom configuration
    ///
    /// Fails with [`EdgeClientError::Config`] if the configuration holds an
    /// unusable value.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.connection.endpoint_url, &config.timeouts)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a client over an arbitrary transport
    ///
    /// An unusable session TTL falls back to the default lifetime.
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let ttl = config.session.ttl().unwrap_or_else(|e| {
            warn!(error = %e, "Using default session lifetime");
            chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS)
        });
        let session = Session::with_ttl(ttl);
        Self {
            transport,
            config,
            session: RwLock::new(session),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Session State
    // =========================================================================

    /// Current authentication state
    pub fn auth_state(&self) -> AuthState {
        self.session.read().auth_state()
    }

    /// Whether the session looks valid, without a network round trip
    pub fn is_session_valid(&self) -> bool {
        self.session.read().is_valid_locally()
    }

    /// Current session token
    pub fn session_id(&self) -> Option<String> {
        self.session.read().token().map(str::to_string)
    }

    /// Expiry of the current session token
    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.read().expires_at()
    }

    pub fn username(&self) -> String {
        self.session.read().username().to_string()
    }

    /// First error code of the latest response
    pub fn last_error_code(&self) -> Option<i64> {
        self.session.read().last_error_code()
    }

    /// Adopt a session token obtained elsewhere (cookie, header, CLI flag)
    pub fn restore_session(&self, token: impl Into<String>) {
        self.session.write().set_token(Some(token.into()));
    }

    /// Drop the current session token
    pub fn clear_session(&self) {
        self.session.write().set_token(None);
    }

    // =========================================================================
    // Command Execution
    // =========================================================================

    /// Run a single command and return its result
    #[instrument(skip(self, command), fields(command = command.name()))]
    pub async fn run_command(&self, command: Command) -> Result<CommandResult> {
        let mut result = self.run_commands(CommandBatch::single(command)).await?;
        result.take("1").ok_or_else(|| {
            EdgeClientError::MalformedResponse("result for label '1' missing".into())
        })
    }

    /// Run a labeled batch of commands
    #[instrument(skip(self, batch), fields(commands = batch.len()))]
    pub async fn run_commands(&self, batch: CommandBatch) -> Result<BatchResult> {
        self.send_batch(&batch).await
    }

    /// Send a batch with the current session envelope
    pub async fn send_batch(&self, batch: &CommandBatch) -> Result<BatchResult> {
        let payload = {
            let session = self.session.read();
            batch.to_payload(session.token())
        };
        self.dispatch(&payload, batch.labels()).await
    }

    /// Post a payload, retrying transient failures, and normalize the answer
    async fn dispatch<'a>(
        &self,
        payload: &Value,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<BatchResult> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let delay = self.config.retry.delay();

        for attempt in 1..=max_attempts {
            match self.transport.post(payload).await {
                Ok(Some(body)) => {
                    let result = BatchResult::from_response(body, labels)?;
                    self.session.write().set_last_error(result.first_error_code());
                    debug!(attempt, success = result.success, "Batch completed");
                    return Ok(result);
                }
                Ok(None) => {
                    error!(attempt, "Received empty response from API");
                    return Err(EdgeClientError::EmptyResponse);
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, max_attempts, error = %e, "Batch request failed");
                    if attempt < max_attempts && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    error!(attempt, error = %e, "Unusable response from API");
                    return Err(EdgeClientError::MalformedResponse(e.to_string()));
                }
            }
        }

        error!(max_attempts, "Failed to make the request after multiple retries");
        Err(EdgeClientError::ServiceUnavailable {
            attempts: max_attempts,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in with a password or, during an MFA challenge, a one-time code
    ///
    /// The login command travels under the reserved `auth` label in place of
    /// the session envelope. Any current token is dropped first.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        {
            let mut session = self.session.write();
            session.set_token(None);
            session.set_username(username);
        }

        let login = Command::new("api.authenticate")
            .param("username", username)
            .param("password", password);
        let mut payload = Map::new();
        payload.insert(AUTH_LABEL.to_string(), command_value(&login));

        let mut result = self
            .dispatch(&Value::Object(payload), [AUTH_LABEL])
            .await?;
        let entry = result.take(AUTH_LABEL).ok_or_else(|| {
            EdgeClientError::MalformedResponse("login result missing".into())
        })?;

        if entry.success {
            let token = entry
                .param_str("sessionId")
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    EdgeClientError::MalformedResponse("login succeeded without a sessionId".into())
                })?;
            self.session.write().set_token(Some(token.to_string()));
            info!(username, "Authentication successful");
            return Ok(LoginOutcome::Authenticated);
        }

        if entry.first_error_code() == Some(MFA_REQUIRED_CODE) {
            info!(username, "MFA required");
            return Ok(LoginOutcome::MfaRequired);
        }

        warn!(username, error_codes = ?entry.error_codes, "Authentication failed");
        Err(EdgeClientError::AuthenticationFailed {
            error_codes: entry.error_codes,
        })
    }

    /// Complete a pending MFA challenge
    #[instrument(skip(self, mfa_code))]
    pub async fn submit_mfa(&self, mfa_code: &str) -> Result<()> {
        if self.auth_state() != AuthState::WaitingForMfa {
            return Err(EdgeClientError::MfaNotRequired);
        }

        let username = self.username();
        match self.authenticate(&username, mfa_code).await? {
            LoginOutcome::Authenticated => Ok(()),
            LoginOutcome::MfaRequired => {
                error!(username, "Unexpected MFA required response during MFA submission");
                Err(EdgeClientError::UnexpectedAuthState)
            }
        }
    }

    /// Log in and confirm the new session with the backend
    #[instrument(skip(self, password))]
    pub async fn authenticate_user(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let outcome = self.authenticate(username, password).await?;
        if outcome == LoginOutcome::Authenticated && !self.is_authenticated().await {
            error!(username, "Failed to verify authentication state");
            return Err(EdgeClientError::AuthenticationFailed {
                error_codes: self.last_error_code().into_iter().collect(),
            });
        }
        Ok(outcome)
    }

    /// Ask the backend whether the current session is still alive
    ///
    /// Missing or placeholder tokens are cleared without a network call; a
    /// failed `session.info` clears the token.
    #[instrument(skip(self))]
    pub async fn verify_auth_state(&self) -> Result<AuthState> {
        if self.session.read().has_placeholder_token() {
            self.session.write().set_token(None);
            info!("Auth state set to not authenticated due to invalid session ID");
            return Ok(self.auth_state());
        }

        debug!(session = %self.session.read().redacted_token(), "Verifying session");
        let result = self.run_command(Command::new("session.info")).await?;
        if !result.success {
            self.session.write().set_token(None);
            warn!(
                error_codes = ?result.error_codes,
                "Auth state set to not authenticated after failed verification"
            );
        }
        Ok(self.auth_state())
    }

    /// Boolean form of [`verify_auth_state`](Self::verify_auth_state)
    pub async fn is_authenticated(&self) -> bool {
        match self.verify_auth_state().await {
            Ok(state) => state == AuthState::Authenticated,
            Err(e) => {
                warn!(error = %e, "Session verification failed");
                false
            }
        }
    }

    /// Switch the session to another organization
    #[instrument(skip(self))]
    pub async fn switch_organization(&self, org_id: &str) -> Result<()> {
        if self.auth_state() != AuthState::Authenticated {
            return Err(EdgeClientError::NotAuthenticated);
        }

        let command = Command::new("session.org.switch").param("id", org_id);
        let result = self.run_command(command).await?;
        if result.success {
            info!(org_id, "Switched organization");
            Ok(())
        } else {
            Err(EdgeClientError::rejected(
                "session.org.switch",
                result.error_codes,
            ))
        }
    }

    /// End the session on the backend and drop the local token
    #[instrument(skip(self))]
    pub async fn close_session(&self) -> Result<CommandResult> {
        let token = self.session_id().ok_or(EdgeClientError::NotAuthenticated)?;

        let result = self
            .run_command(Command::new("session.end").param("id", token))
            .await?;
        if !result.success {
            error!(error_codes = ?result.error_codes, "Error closing session");
            return Err(EdgeClientError::rejected("session.end", result.error_codes));
        }

        self.clear_session();
        info!("Session closed");
        Ok(result)
    }
}

impl std::fmt::Debug for EdgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeClient")
            .field("endpoint", &self.config.connection.endpoint_url)
            .field("auth_state", &self.auth_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport, TransportError};
    use serde_json::json;

    fn client_with(mock: &Arc<MockTransport>) -> EdgeClient {
        let config = ClientConfig::builder("http://mock.test/api")
            .no_delays()
            .build();
        EdgeClient::with_transport(mock.clone(), config)
    }

    #[test]
    fn test_client_creation() {
        let client = EdgeClient::new("http://localhost:9080/api");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().auth_state(), AuthState::NotAuthenticated);
    }

    #[test]
    fn test_with_config_rejects_unusable_ttl() {
        let config = ClientConfig::builder("http://localhost:9080/api")
            .session_ttl_secs(i64::MAX)
            .build();
        let err = EdgeClient::with_config(config).unwrap_err();
        assert!(matches!(err, EdgeClientError::Config(_)));
    }

    #[test]
    fn test_with_transport_falls_back_to_default_ttl() {
        let mock = Arc::new(MockTransport::new());
        let config = ClientConfig::builder("http://mock.test/api")
            .session_ttl_secs(10_000_000_000_000)
            .build();
        let client = EdgeClient::with_transport(mock, config);

        client.restore_session("sess-ttl");
        let expires_at = client.session_expires_at().unwrap();
        let remaining = expires_at - Utc::now();
        assert!(remaining <= chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS));
        assert!(remaining > chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS - 60));
    }

    #[test]
    fn test_placeholder_session_counts_as_valid_until_verified() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);
        client.restore_session("None");

        assert_eq!(client.auth_state(), AuthState::Authenticated);
        assert!(client.is_session_valid());
    }

    #[test]
    fn test_invalid_url() {
        let client = EdgeClient::new("not a url");
        assert!(client.is_err());
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_third_attempt() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_error()
            .push(MockReply::Error(TransportError::Timeout("30s".into())))
            .push_body(json!({ "1": { "success": true, "params": {} } }));
        let client = client_with(&mock);

        let result = client.run_command(Command::new("session.info")).await.unwrap();
        assert!(result.success);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_service_unavailable() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_error()
            .push_connection_error()
            .push_connection_error()
            .push_body(json!({ "1": { "success": true } }));
        let client = client_with(&mock);

        let err = client
            .run_command(Command::new("session.info"))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeClientError::ServiceUnavailable { attempts: 3 }));
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_body_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockReply::Empty)
            .push_body(json!({ "1": { "success": true } }));
        let client = client_with(&mock);

        let err = client
            .run_command(Command::new("session.info"))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeClientError::EmptyResponse));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_protocol_error_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockReply::Error(TransportError::ProtocolError("html".into())));
        let client = client_with(&mock);

        let err = client
            .run_command(Command::new("session.info"))
            .await
            .unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_request_carries_session_envelope() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({ "1": { "success": true } }));
        let client = client_with(&mock);
        client.restore_session("token-abc");

        client.run_command(Command::new("session.info")).await.unwrap();

        let requests = mock.requests();
        let sent = &requests[0];
        assert_eq!(sent["auth"]["sessionId"], "token-abc");
        assert_eq!(sent["1"]["command"], "session.info");
    }

    #[tokio::test]
    async fn test_any_response_can_signal_mfa() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({ "success": false, "errorCodes": [MFA_REQUIRED_CODE] }))
            .push_body(json!({ "1": { "success": true } }));
        let client = client_with(&mock);

        let result = client.run_command(Command::new("thing.list")).await.unwrap();
        assert!(!result.success);
        assert_eq!(client.auth_state(), AuthState::WaitingForMfa);

        client.run_command(Command::new("thing.list")).await.unwrap();
        assert_eq!(client.last_error_code(), None);
        assert_eq!(client.auth_state(), AuthState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({
            "auth": { "success": true, "params": { "sessionId": "sess-1" } }
        }));
        let client = client_with(&mock);

        let outcome = client.authenticate("ops@example.com", "secret").await.unwrap();
        assert_eq!(outcome, LoginOutcome::Authenticated);
        assert_eq!(client.session_id().as_deref(), Some("sess-1"));
        assert_eq!(client.username(), "ops@example.com");
        assert!(client.is_session_valid());

        let requests = mock.requests();
        let sent = &requests[0];
        assert_eq!(sent["auth"]["command"], "api.authenticate");
        assert_eq!(sent["auth"]["params"]["username"], "ops@example.com");
        assert!(sent["auth"].get("sessionId").is_none());
    }

    #[tokio::test]
    async fn test_authenticate_then_mfa() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({
            "success": false,
            "errorCodes": [MFA_REQUIRED_CODE]
        }))
        .push_body(json!({
            "auth": { "success": true, "params": { "sessionId": "sess-2" } }
        }));
        let client = client_with(&mock);

        let outcome = client.authenticate("ops@example.com", "secret").await.unwrap();
        assert_eq!(outcome, LoginOutcome::MfaRequired);
        assert_eq!(client.auth_state(), AuthState::WaitingForMfa);

        client.submit_mfa("123456").await.unwrap();
        assert_eq!(client.auth_state(), AuthState::Authenticated);
        assert_eq!(mock.requests()[1]["auth"]["params"]["password"], "123456");
        assert_eq!(
            mock.requests()[1]["auth"]["params"]["username"],
            "ops@example.com"
        );
    }

    #[tokio::test]
    async fn test_submit_mfa_without_challenge() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);

        let err = client.submit_mfa("123456").await.unwrap_err();
        assert!(matches!(err, EdgeClientError::MfaNotRequired));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_mfa_challenge_is_unexpected() {
        let mock = Arc::new(MockTransport::new());
        let challenge = json!({ "auth": { "success": false, "errorCodes": [MFA_REQUIRED_CODE] } });
        mock.push_body(challenge.clone()).push_body(challenge);
        let client = client_with(&mock);

        client.authenticate("ops@example.com", "secret").await.unwrap();
        let err = client.submit_mfa("000000").await.unwrap_err();
        assert!(matches!(err, EdgeClientError::UnexpectedAuthState));
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({ "auth": { "success": false, "errorCodes": [-90001] } }));
        let client = client_with(&mock);

        let err = client.authenticate("ops@example.com", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            EdgeClientError::AuthenticationFailed { ref error_codes } if error_codes == &vec![-90001]
        ));
        assert_eq!(client.auth_state(), AuthState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_authenticate_user_verifies_session() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({
            "auth": { "success": true, "params": { "sessionId": "sess-3" } }
        }))
        .push_body(json!({ "1": { "success": false, "errorCodes": [-90002] } }));
        let client = client_with(&mock);

        let err = client
            .authenticate_user("ops@example.com", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeClientError::AuthenticationFailed { .. }));
        assert_eq!(client.session_id(), None);
        assert_eq!(mock.requests()[1]["1"]["command"], "session.info");
    }

    #[tokio::test]
    async fn test_verify_placeholder_token_skips_network() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);
        client.restore_session("null");

        let state = client.verify_auth_state().await.unwrap();
        assert_eq!(state, AuthState::NotAuthenticated);
        assert_eq!(client.session_id(), None);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_verify_keeps_live_session() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({ "1": { "success": true, "params": {} } }));
        let client = client_with(&mock);
        client.restore_session("sess-4");

        assert!(client.is_authenticated().await);
        assert_eq!(client.session_id().as_deref(), Some("sess-4"));
    }

    #[tokio::test]
    async fn test_switch_organization_requires_session() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);

        let err = client.switch_organization("org-1").await.unwrap_err();
        assert!(matches!(err, EdgeClientError::NotAuthenticated));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_close_session_clears_token() {
        let mock = Arc::new(MockTransport::new());
        mock.push_body(json!({ "1": { "success": true } }));
        let client = client_with(&mock);
        client.restore_session("sess-5");

        client.close_session().await.unwrap();
        assert_eq!(client.session_id(), None);
        assert_eq!(mock.requests()[0]["1"]["command"], "session.end");
        assert_eq!(mock.requests()[0]["1"]["params"]["id"], "sess-5");
    }
}
