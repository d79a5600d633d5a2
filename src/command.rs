//! Command requests and the fixed endpoint table of the control channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Header carrying the CSRF token on every command POST.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Cookie the token endpoint sets alongside the JSON token.
pub const CSRF_COOKIE: &str = "csrftoken";

//////////////////////////////////////////////// Endpoint ///////////////////////////////////////////////

/// The endpoints exposed by the Django side of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// GET endpoint returning `{"token": ...}`.
    CsrfToken,
    /// Runs `manage.py migrate`.
    Migrate,
    /// Flushes the database.
    RefreshDatabase,
    /// Runs an arbitrary management command.
    Manage,
    /// Creates a user fixture.
    CreateUser,
}

impl Endpoint {
    /// All endpoints in a stable order.
    pub const ALL: [Endpoint; 5] = [
        Endpoint::CsrfToken,
        Endpoint::Migrate,
        Endpoint::RefreshDatabase,
        Endpoint::Manage,
        Endpoint::CreateUser,
    ];

    /// The absolute path of the endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::CsrfToken => "/__cypress__/csrftoken/",
            Endpoint::Migrate => "/__cypress__/migrate/",
            Endpoint::RefreshDatabase => "/__cypress__/refreshDatabase/",
            Endpoint::Manage => "/__cypress__/manage/",
            Endpoint::CreateUser => "/__cypress__/createUser/",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

///////////////////////////////////////////// CommandRequest ////////////////////////////////////////////

/// Body of a `manage` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManageRequest {
    /// Name of the management command.
    pub command: String,
    /// Positional parameters, passed through in order.
    pub parameters: Vec<String>,
}

/// A single state-mutating command sent over the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// Apply migrations.
    Migrate,
    /// Reset the database to a clean state.
    RefreshDatabase,
    /// Run a named management command with string parameters.
    Manage {
        /// Name of the management command.
        command: String,
        /// Positional parameters.
        parameters: Vec<String>,
    },
    /// Create a user from the given attributes.
    CreateUser {
        /// Attributes sent verbatim as the request body.
        attributes: BTreeMap<String, String>,
    },
}

impl CommandRequest {
    /// Builds a `Manage` request.
    pub fn manage<S: Into<String>>(command: S, parameters: Vec<String>) -> Self {
        CommandRequest::Manage {
            command: command.into(),
            parameters,
        }
    }

    /// The endpoint this command is POSTed to.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            CommandRequest::Migrate => Endpoint::Migrate,
            CommandRequest::RefreshDatabase => Endpoint::RefreshDatabase,
            CommandRequest::Manage { .. } => Endpoint::Manage,
            CommandRequest::CreateUser { .. } => Endpoint::CreateUser,
        }
    }

    /// The JSON body of the POST.
    pub fn body(&self) -> Value {
        match self {
            CommandRequest::Migrate | CommandRequest::RefreshDatabase => json!({}),
            CommandRequest::Manage {
                command,
                parameters,
            } => json!({
                "command": command,
                "parameters": parameters,
            }),
            CommandRequest::CreateUser { attributes } => json!(attributes),
        }
    }

    /// Short name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            CommandRequest::Migrate => "migrate",
            CommandRequest::RefreshDatabase => "refreshDatabase",
            CommandRequest::Manage { .. } => "manage",
            CommandRequest::CreateUser { .. } => "createUser",
        }
    }
}

/// Errors from parsing `key=value` user attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeParseError {
    /// The argument contains no `=`.
    MissingSeparator(String),
    /// The key before `=` is empty.
    EmptyKey(String),
}

impl std::fmt::Display for AttributeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator(arg) => write!(f, "Attribute '{}' is not key=value", arg),
            Self::EmptyKey(arg) => write!(f, "Attribute '{}' has an empty key", arg),
        }
    }
}

impl std::error::Error for AttributeParseError {}

/// Parses `key=value` arguments into a user attribute mapping.
///
/// Only the first `=` separates key from value, so values may contain `=`.
/// A repeated key keeps its last value.
pub fn parse_attributes<S: AsRef<str>>(
    args: &[S],
) -> Result<BTreeMap<String, String>, AttributeParseError> {
    let mut attributes = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| AttributeParseError::MissingSeparator(arg.to_string()))?;
        if key.is_empty() {
            return Err(AttributeParseError::EmptyKey(arg.to_string()));
        }
        attributes.insert(key.to_string(), value.to_string());
    }
    Ok(attributes)
}
