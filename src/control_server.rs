//! In-process stand-in for the Django side of the control channel.
//!
//! The router serves the same five endpoints as the Django views: a token
//! endpoint that hands out CSRF tokens, and four POST endpoints that accept a
//! command only when its `X-CSRFToken` header carries a token that was issued.
//! Nothing is executed; every request is recorded so that callers can check
//! exactly what reached the server and in which order.
//!
//! A malformed `manage` body is answered with 500, the status Django returns
//! when `ManageView` fails to unpack it.
//!
//! State created with [`ControlState::new`] keeps every request and token.
//! Long-running servers use [`ControlState::with_log_capacity`], which keeps
//! only the most recent entries of both.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::command::{CSRF_COOKIE, CSRF_HEADER, Endpoint, ManageRequest};

const TOKEN_LEN: usize = 64;
const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A request as it was received by the stand-in server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Value of the `X-CSRFToken` header, if sent.
    pub csrf_header: Option<String>,
    /// Value of the `csrftoken` cookie, if sent.
    pub csrf_cookie: Option<String>,
    /// JSON body; `null` when the body was empty.
    pub body: Value,
}

#[derive(Debug, Default)]
struct ControlInner {
    issued: HashSet<String>,
    issued_order: VecDeque<String>,
    requests: VecDeque<RecordedRequest>,
    capacity: Option<usize>,
    token_failure: Option<u16>,
    malformed_token: bool,
    command_failure: Option<u16>,
}

impl ControlInner {
    fn push_request(&mut self, request: RecordedRequest) {
        self.requests.push_back(request);
        if let Some(capacity) = self.capacity {
            while self.requests.len() > capacity {
                self.requests.pop_front();
            }
        }
    }

    fn issue(&mut self, token: String) {
        if self.issued.insert(token.clone()) {
            self.issued_order.push_back(token);
        }
        if let Some(capacity) = self.capacity {
            while self.issued_order.len() > capacity {
                if let Some(oldest) = self.issued_order.pop_front() {
                    self.issued.remove(&oldest);
                }
            }
        }
    }
}

/// Shared state of the stand-in server.
///
/// Cloning is cheap; clones observe the same tokens and request log.
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    inner: Arc<Mutex<ControlInner>>,
}

impl ControlState {
    /// Creates state with no issued tokens and an unbounded request log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates state that keeps at most `capacity` requests and `capacity`
    /// tokens, dropping the oldest first.
    ///
    /// A token dropped from the set is no longer accepted by the command
    /// endpoints. `capacity` is raised to 1 if zero.
    pub fn with_log_capacity(capacity: usize) -> Self {
        let state = Self::default();
        state.lock().capacity = Some(capacity.max(1));
        state
    }

    /// Every request still retained, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.iter().cloned().collect()
    }

    /// Tokens handed out by the token endpoint.
    pub fn issued_tokens(&self) -> HashSet<String> {
        self.lock().issued.clone()
    }

    /// Makes the token endpoint answer with `status` instead of a token.
    pub fn fail_token_fetch(&self, status: u16) {
        self.lock().token_failure = Some(status);
    }

    /// Makes the token endpoint answer 200 with a body that has no `token` field.
    pub fn malformed_token(&self) {
        self.lock().malformed_token = true;
    }

    /// Makes every command endpoint answer with `status` after CSRF checks pass.
    pub fn fail_command(&self, status: u16) {
        self.lock().command_failure = Some(status);
    }

    /// Clears injected failures and the request log. Issued tokens are kept.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.requests.clear();
        inner.token_failure = None;
        inner.malformed_token = false;
        inner.command_failure = None;
    }

    fn lock(&self) -> MutexGuard<'_, ControlInner> {
        // No mutation can panic halfway, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, method: &Method, endpoint: Endpoint, headers: &HeaderMap, body: Value) {
        let request = RecordedRequest {
            method: method.as_str().to_string(),
            path: endpoint.path().to_string(),
            csrf_header: header_str(headers, CSRF_HEADER),
            csrf_cookie: csrf_cookie(headers),
            body,
        };
        tracing::debug!(method = %request.method, path = %request.path, "control request");
        self.lock().push_request(request);
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn csrf_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CSRF_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Generates a 64-character alphanumeric token using `/dev/urandom`.
pub fn random_token() -> std::io::Result<String> {
    let mut random_bytes = [0u8; TOKEN_LEN];
    let mut file = File::open("/dev/urandom")?;
    file.read_exact(&mut random_bytes)?;
    Ok(random_bytes
        .iter()
        .map(|b| TOKEN_CHARS[*b as usize % TOKEN_CHARS.len()] as char)
        .collect())
}

fn status_or_500(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn injected_failure(status: u16) -> Response {
    (
        status_or_500(status),
        Json(json!({"detail": "Injected failure"})),
    )
        .into_response()
}

/////////////////////////////////////////////// Handlers ///////////////////////////////////////////////

async fn csrf_token(State(state): State<ControlState>, headers: HeaderMap) -> Response {
    state.record(&Method::GET, Endpoint::CsrfToken, &headers, Value::Null);

    if let Some(status) = state.lock().token_failure {
        return injected_failure(status);
    }
    if state.lock().malformed_token {
        return Json(json!({"detail": "No token here"})).into_response();
    }

    let token = match random_token() {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("failed to generate CSRF token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Token generation failed"})),
            )
                .into_response();
        }
    };
    state.lock().issue(token.clone());

    let cookie = format!("{}={}; Path=/; SameSite=Lax", CSRF_COOKIE, token);
    let mut response = Json(json!({"token": token})).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn handle_command(
    state: ControlState,
    endpoint: Endpoint,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed = if body.is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(&body)
    };
    let recorded = parsed.as_ref().cloned().unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&body).into_owned())
    });
    state.record(&Method::POST, endpoint, &headers, recorded);

    let authorized = header_str(&headers, CSRF_HEADER)
        .map(|token| state.lock().issued.contains(&token))
        .unwrap_or(false);
    if !authorized {
        tracing::warn!(path = endpoint.path(), "rejected command without a valid CSRF token");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "CSRF verification failed."})),
        )
            .into_response();
    }

    if let Some(status) = state.lock().command_failure {
        return injected_failure(status);
    }

    let body = match parsed {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": format!("Invalid JSON body: {}", e)})),
            )
                .into_response();
        }
    };

    match endpoint {
        Endpoint::Manage => {
            if let Err(e) = serde_json::from_value::<ManageRequest>(body) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": format!("Invalid manage request: {}", e)})),
                )
                    .into_response();
            }
        }
        Endpoint::CreateUser => {
            if !body.is_object() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"detail": "User attributes must be an object"})),
                )
                    .into_response();
            }
        }
        _ => {}
    }

    Json(json!({"success": true})).into_response()
}

async fn migrate(State(state): State<ControlState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_command(state, Endpoint::Migrate, headers, body).await
}

async fn refresh_database(
    State(state): State<ControlState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_command(state, Endpoint::RefreshDatabase, headers, body).await
}

async fn manage(State(state): State<ControlState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_command(state, Endpoint::Manage, headers, body).await
}

async fn create_user(
    State(state): State<ControlState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_command(state, Endpoint::CreateUser, headers, body).await
}

/// Creates the router serving all five control endpoints.
pub fn create_control_router(state: ControlState) -> Router {
    Router::new()
        .route(Endpoint::CsrfToken.path(), get(csrf_token))
        .route(Endpoint::Migrate.path(), post(migrate))
        .route(Endpoint::RefreshDatabase.path(), post(refresh_database))
        .route(Endpoint::Manage.path(), post(manage))
        .route(Endpoint::CreateUser.path(), post(create_user))
        .with_state(state)
}

/// Binds `addr` and serves the control router in a background task.
///
/// Binding port 0 picks a free port; the bound address is returned.
pub async fn spawn_control_server(
    addr: &str,
    state: ControlState,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = create_control_router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("control server error: {}", e);
        }
    });
    Ok((local_addr, handle))
}
