use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Response, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::command::{CSRF_HEADER, CommandRequest, Endpoint};
use crate::errors::ControlError;

/// Environment variable consulted when no base URL is given explicitly.
pub const BASE_URL_ENV: &str = "DJANGO_CYPRESS_BASE_URL";

/// Base URL used when neither an option nor the environment provides one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Connection settings for a [`ControlClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scheme and authority of the Django server, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Per-request timeout enforced by the HTTP client. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a config for `base_url` with no timeout.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    /// Resolves the base URL from `explicit`, then the environment, then the default.
    pub fn resolve(explicit: Option<String>) -> Self {
        let base_url = explicit
            .filter(|url| !url.is_empty())
            .or_else(|| std::env::var(BASE_URL_ENV).ok().filter(|url| !url.is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The outcome of a successful call on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, a string for non-JSON bodies, or `null` when empty.
    pub body: Value,
}

impl ControlResponse {
    /// The `token` field of a token-endpoint response.
    pub fn token(&self) -> Result<&str, ControlError> {
        self.body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ControlError::MissingToken {
                body: self.body.to_string(),
            })
    }
}

/// Client for the CSRF-protected control channel.
///
/// Every command costs two round trips: a fresh token fetch and the command
/// POST carrying that token. Tokens are never cached between commands. The
/// underlying HTTP client keeps cookies so the `csrftoken` cookie set by the
/// token endpoint accompanies the POST, which Django's CSRF check requires.
#[derive(Debug, Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
}

impl ControlClient {
    /// Creates a client for `base_url` with default settings.
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self, ControlError> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Creates a client from an explicit configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self, ControlError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|_| ControlError::InvalidBaseUrl(config.base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err(ControlError::InvalidBaseUrl(config.base_url));
        }

        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ControlError::transport(&base_url, e))?;

        Ok(Self { client, base_url })
    }

    /// The base URL requests are sent to, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Constructs the full URL of an endpoint.
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Fetches a CSRF token.
    ///
    /// The response body carries the token in its `token` field; see
    /// [`ControlResponse::token`]. A non-success status is returned as
    /// [`ControlError::Status`] with the body untouched.
    pub async fn csrf_token(&self) -> Result<ControlResponse, ControlError> {
        let endpoint = Endpoint::CsrfToken;
        let url = self.url(endpoint);
        debug!(url = %url, "fetching CSRF token");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ControlError::transport(endpoint.path(), e))?;
        self.handle_response(endpoint, response).await
    }

    /// Fetches a fresh token and POSTs `request` with it attached.
    ///
    /// The POST is only issued after the token fetch has succeeded.
    pub async fn dispatch(
        &self,
        request: &CommandRequest,
    ) -> Result<ControlResponse, ControlError> {
        let token_response = self.csrf_token().await?;
        let token = token_response.token()?;

        let endpoint = request.endpoint();
        let url = self.url(endpoint);
        debug!(url = %url, command = request.name(), "sending command");
        let response = self
            .client
            .post(&url)
            .header(CSRF_HEADER, token)
            // Django rejects HTTPS POSTs without a same-origin Referer.
            .header(header::REFERER, format!("{}/", self.base_url))
            .json(&request.body())
            .send()
            .await
            .map_err(|e| ControlError::transport(endpoint.path(), e))?;
        let response = self.handle_response(endpoint, response).await?;

        info!(
            command = request.name(),
            status = response.status,
            "command completed"
        );
        Ok(response)
    }

    /// Runs migrations on the server.
    pub async fn migrate(&self) -> Result<ControlResponse, ControlError> {
        self.dispatch(&CommandRequest::Migrate).await
    }

    /// Resets the server database to a clean state.
    pub async fn refresh_database(&self) -> Result<ControlResponse, ControlError> {
        self.dispatch(&CommandRequest::RefreshDatabase).await
    }

    /// Runs the management command `command` with `parameters` in order.
    ///
    /// Pass `&[]` to run it without parameters.
    pub async fn manage(
        &self,
        command: &str,
        parameters: &[&str],
    ) -> Result<ControlResponse, ControlError> {
        let parameters = parameters.iter().map(|p| p.to_string()).collect();
        self.dispatch(&CommandRequest::manage(command, parameters))
            .await
    }

    /// Creates a user fixture; `attributes` is sent verbatim as the body.
    pub async fn create_user(
        &self,
        attributes: &BTreeMap<String, String>,
    ) -> Result<ControlResponse, ControlError> {
        self.dispatch(&CommandRequest::CreateUser {
            attributes: attributes.clone(),
        })
        .await
    }

    /// Converts a response into a [`ControlResponse`] or a status error.
    async fn handle_response(
        &self,
        endpoint: Endpoint,
        response: Response,
    ) -> Result<ControlResponse, ControlError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ControlError::transport(endpoint.path(), e))?;

        if !status.is_success() {
            return Err(ControlError::Status {
                endpoint: endpoint.path().to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ControlResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_server::{ControlState, spawn_control_server};
    use serde_json::json;

    async fn setup() -> (ControlClient, ControlState) {
        let state = ControlState::new();
        let (addr, _handle) = spawn_control_server("127.0.0.1:0", state.clone())
            .await
            .unwrap();
        let client = ControlClient::new(format!("http://{}", addr)).unwrap();
        (client, state)
    }

    /// Asserts the log is exactly one token GET followed by one POST to
    /// `endpoint` carrying the token from that GET.
    fn assert_token_then_post(
        state: &ControlState,
        endpoint: Endpoint,
    ) -> crate::control_server::RecordedRequest {
        let requests = state.requests();
        assert_eq!(requests.len(), 2, "requests: {:?}", requests);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, Endpoint::CsrfToken.path());
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].path, endpoint.path());

        let token = requests[1].csrf_header.clone().unwrap();
        assert!(state.issued_tokens().contains(&token));
        assert_eq!(state.issued_tokens().len(), 1);
        requests[1].clone()
    }

    #[test]
    fn rejects_invalid_base_urls() {
        assert!(matches!(
            ControlClient::new("not a url"),
            Err(ControlError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            ControlClient::new("ftp://example.com"),
            Err(ControlError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn url_construction() {
        let client = ControlClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.url(Endpoint::Manage),
            "http://localhost:8000/__cypress__/manage/"
        );
    }

    #[test]
    fn resolve_prefers_explicit_url() {
        let config = ClientConfig::resolve(Some("http://example.test".to_string()))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://example.test");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn token_extraction() {
        let response = ControlResponse {
            status: 200,
            body: json!({"token": "abc"}),
        };
        assert_eq!(response.token(), Ok("abc"));

        let response = ControlResponse {
            status: 200,
            body: json!({"token": 7}),
        };
        assert!(matches!(
            response.token(),
            Err(ControlError::MissingToken { .. })
        ));
    }

    #[tokio::test]
    async fn csrf_token_returns_token_body() {
        let (client, state) = setup().await;

        let response = client.csrf_token().await.unwrap();
        assert_eq!(response.status, 200);
        let token = response.token().unwrap().to_string();
        assert!(state.issued_tokens().contains(&token));
        assert_eq!(state.requests().len(), 1);
    }

    #[tokio::test]
    async fn migrate_sends_token_from_preceding_fetch() {
        let (client, state) = setup().await;

        let response = client.migrate().await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"success": true}));

        let post = assert_token_then_post(&state, Endpoint::Migrate);
        assert_eq!(post.body, json!({}));
    }

    #[tokio::test]
    async fn refresh_database_sends_empty_body() {
        let (client, state) = setup().await;

        client.refresh_database().await.unwrap();

        let post = assert_token_then_post(&state, Endpoint::RefreshDatabase);
        assert_eq!(post.body, json!({}));
    }

    #[tokio::test]
    async fn manage_sends_command_and_parameters() {
        let (client, state) = setup().await;

        client.manage("loaddata", &["fixture.json"]).await.unwrap();

        let post = assert_token_then_post(&state, Endpoint::Manage);
        assert_eq!(
            serde_json::to_string(&post.body).unwrap(),
            r#"{"command":"loaddata","parameters":["fixture.json"]}"#
        );
    }

    #[tokio::test]
    async fn manage_without_parameters_sends_empty_list() {
        let (client, state) = setup().await;

        client.manage("flush", &[]).await.unwrap();

        let post = assert_token_then_post(&state, Endpoint::Manage);
        assert_eq!(post.body, json!({"command": "flush", "parameters": []}));
    }

    #[tokio::test]
    async fn create_user_sends_attributes_verbatim() {
        let (client, state) = setup().await;

        let mut attributes = BTreeMap::new();
        attributes.insert("username".to_string(), "django-user".to_string());
        attributes.insert("password".to_string(), "123456789".to_string());
        client.create_user(&attributes).await.unwrap();

        let post = assert_token_then_post(&state, Endpoint::CreateUser);
        let received: BTreeMap<String, String> = serde_json::from_value(post.body).unwrap();
        assert_eq!(received, attributes);
    }

    #[tokio::test]
    async fn each_command_fetches_its_own_token() {
        let (client, state) = setup().await;

        client.migrate().await.unwrap();
        client.refresh_database().await.unwrap();

        let requests = state.requests();
        assert_eq!(requests.len(), 4);
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                Endpoint::CsrfToken.path(),
                Endpoint::Migrate.path(),
                Endpoint::CsrfToken.path(),
                Endpoint::RefreshDatabase.path(),
            ]
        );
        assert_ne!(requests[1].csrf_header, requests[3].csrf_header);
        assert_eq!(state.issued_tokens().len(), 2);
    }

    #[tokio::test]
    async fn failed_token_fetch_issues_no_command() {
        let (client, state) = setup().await;
        state.fail_token_fetch(500);

        let err = client.migrate().await.unwrap_err();
        match err {
            ControlError::Status {
                ref endpoint,
                status,
                ..
            } => {
                assert_eq!(endpoint, Endpoint::CsrfToken.path());
                assert_eq!(status, 500);
            }
            other => panic!("Expected status error, got {:?}", other),
        }

        let requests = state.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, Endpoint::CsrfToken.path());
    }

    #[tokio::test]
    async fn token_response_without_token_issues_no_command() {
        let (client, state) = setup().await;
        state.malformed_token();

        let err = client.refresh_database().await.unwrap_err();
        assert!(
            matches!(err, ControlError::MissingToken { ref body } if body.contains("detail")),
            "unexpected error: {:?}",
            err
        );

        let requests = state.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, Endpoint::CsrfToken.path());
    }

    #[tokio::test]
    async fn failed_command_surfaces_status_and_body() {
        let (client, state) = setup().await;
        state.fail_command(500);

        let err = client.manage("flush", &["--no-input"]).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        match err {
            ControlError::Status { endpoint, body, .. } => {
                assert_eq!(endpoint, Endpoint::Manage.path());
                assert!(body.contains("Injected failure"));
            }
            other => panic!("Expected status error, got {:?}", other),
        }
        assert_eq!(state.requests().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        // Bind then drop to obtain a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlClient::new(format!("http://{}", addr)).unwrap();
        let err = client.migrate().await.unwrap_err();
        assert!(matches!(err, ControlError::Transport { .. }));
    }
}
