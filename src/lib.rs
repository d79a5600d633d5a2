//! # django-cypress: Test Fixtures over a CSRF-Protected Control Channel
//!
//! End-to-end tests often need the server under test in a known state before
//! they run: migrations applied, the database flushed, a user account in
//! place. This crate drives those fixture operations on a Django server that
//! exposes a small HTTP control channel under `/__cypress__/`.
//!
//! Every operation follows the same two steps:
//!
//! 1. GET `/__cypress__/csrftoken/`, which answers `{"token": "..."}`.
//! 2. POST the command to its endpoint with the header `X-CSRFToken` set to
//!    that token.
//!
//! The token is fetched fresh for every command and used for that command
//! only. Nothing is retried; failures of either request surface to the caller.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /__cypress__/csrftoken/         -> {"token": "..."}
//! POST /__cypress__/migrate/           {}
//! POST /__cypress__/refreshDatabase/   {}
//! POST /__cypress__/manage/            {"command": "...", "parameters": [...]}
//! POST /__cypress__/createUser/        {"username": "...", ...}
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! # use django_cypress::ControlClient;
//! # use std::collections::BTreeMap;
//! # async fn example() -> Result<(), django_cypress::ControlError> {
//! let client = ControlClient::new("http://localhost:8000")?;
//!
//! client.migrate().await?;
//! client.refresh_database().await?;
//! client.manage("loaddata", &["fixture.json"]).await?;
//!
//! let mut user = BTreeMap::new();
//! user.insert("username".to_string(), "django-user".to_string());
//! user.insert("password".to_string(), "123456789".to_string());
//! client.create_user(&user).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without Django
//!
//! [`create_control_router`] serves the same endpoints in-process. It checks
//! CSRF tokens the way Django does, executes nothing, and records every
//! request it receives:
//!
//! ```no_run
//! # use django_cypress::{ControlClient, ControlState, spawn_control_server};
//! # async fn example() {
//! let state = ControlState::new();
//! let (addr, _handle) = spawn_control_server("127.0.0.1:0", state.clone()).await.unwrap();
//! let client = ControlClient::new(format!("http://{}", addr)).unwrap();
//!
//! client.migrate().await.unwrap();
//! assert_eq!(state.requests().len(), 2);
//! # }
//! ```

#![deny(missing_docs)]
mod command;
mod control_server;
mod errors;

/// Command-line interface utilities for program termination, output
/// formatting and logging setup.
pub mod cli_utils;

/// Command-line interface command handlers.
///
/// This module contains the handlers behind the cypressctl binary.
pub mod commands;

/// HTTP client for the control channel.
///
/// This module provides the client that fetches CSRF tokens and sends
/// fixture commands, along with its configuration and response types.
pub mod http_utils;

pub use command::{
    AttributeParseError, CSRF_COOKIE, CSRF_HEADER, CommandRequest, Endpoint, ManageRequest,
    parse_attributes,
};
pub use control_server::{
    ControlState, RecordedRequest, create_control_router, random_token, spawn_control_server,
};
pub use errors::ControlError;
pub use http_utils::{BASE_URL_ENV, ClientConfig, ControlClient, ControlResponse, DEFAULT_BASE_URL};
