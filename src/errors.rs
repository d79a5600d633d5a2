//! Error types for control-channel operations.

/// Errors that can occur while talking to the control channel.
///
/// No variant is recovered from locally; each one surfaces to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The base URL could not be used to build endpoint URLs.
    InvalidBaseUrl(String),
    /// The request could not be sent or its response could not be read.
    Transport {
        /// Path of the endpoint that was being called.
        endpoint: String,
        /// Description of the underlying transport failure.
        message: String,
    },
    /// The server answered with a non-success status.
    Status {
        /// Path of the endpoint that was being called.
        endpoint: String,
        /// The HTTP status code returned by the server.
        status: u16,
        /// The raw response body, unmodified.
        body: String,
    },
    /// The token endpoint answered successfully but without a string `token` field.
    MissingToken {
        /// The body that was received in place of a token.
        body: String,
    },
}

impl ControlError {
    /// Returns the HTTP status code when the server answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn transport(endpoint: &str, err: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(url) => write!(f, "Invalid base URL: {}", url),
            Self::Transport { endpoint, message } => {
                write!(f, "Request to {} failed: {}", endpoint, message)
            }
            Self::Status {
                endpoint,
                status,
                body,
            } => {
                if body.is_empty() {
                    write!(f, "{} returned HTTP {}: No error details", endpoint, status)
                } else {
                    write!(f, "{} returned HTTP {}: {}", endpoint, status, body)
                }
            }
            Self::MissingToken { body } => {
                write!(f, "CSRF token response has no token field: {}", body)
            }
        }
    }
}

impl std::error::Error for ControlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_status_errors() {
        let err = ControlError::Status {
            endpoint: "/__cypress__/migrate/".to_string(),
            status: 500,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "/__cypress__/migrate/ returned HTTP 500: No error details"
        );

        let err = ControlError::MissingToken {
            body: "{}".to_string(),
        };
        assert_eq!(err.status(), None);
    }
}
