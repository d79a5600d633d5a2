//! # Command Error Handling
//!
//! This module provides error handling utilities for cypressctl commands
//! using the handled crate for consistent error property extraction.

use handled::Handle;

use crate::{AttributeParseError, ControlError};

/// User-friendly error information that can be extracted from various error types
#[derive(Debug, Clone)]
pub struct UserError {
    /// The main error message to display to the user
    pub message: String,
    /// Optional usage hint to help the user correct the error
    pub usage_hint: Option<String>,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Handle<UserError> for UserError {
    fn handle(&self) -> Option<UserError> {
        Some(self.clone())
    }
}

impl Handle<UserError> for ControlError {
    fn handle(&self) -> Option<UserError> {
        let usage_hint = match self {
            ControlError::InvalidBaseUrl(_) => Some(
                "Pass --base-url http://host:port or set DJANGO_CYPRESS_BASE_URL".to_string(),
            ),
            ControlError::Transport { .. } => Some(
                "Is the Django server running and serving the __cypress__ URLs?".to_string(),
            ),
            ControlError::MissingToken { .. } => Some(
                "The token endpoint must answer with {\"token\": \"...\"}".to_string(),
            ),
            ControlError::Status { status, .. } => match status {
                403 => Some(
                    "CSRF verification failed. Check CSRF_TRUSTED_ORIGINS and that cookies reach the server."
                        .to_string(),
                ),
                404 => Some(
                    "Endpoint not found. Include django_cypress.urls in the project's URL configuration."
                        .to_string(),
                ),
                400 => Some("Invalid request. Check the command and its arguments.".to_string()),
                500..=599 => Some(
                    "Server error. The management command may have failed; check the server log."
                        .to_string(),
                ),
                _ => None,
            },
        };

        Some(UserError {
            message: self.to_string(),
            usage_hint,
        })
    }
}

impl Handle<UserError> for AttributeParseError {
    fn handle(&self) -> Option<UserError> {
        Some(UserError {
            message: self.to_string(),
            usage_hint: Some(
                "User attributes are given as key=value, e.g. username=django-user".to_string(),
            ),
        })
    }
}

/// Enhanced error formatting for CLI output
pub fn format_cli_error<E>(error: &E) -> String
where
    E: Handle<UserError> + std::fmt::Display,
{
    if let Some(user_error) = error.handle() {
        let mut output = format!("Error: {}", user_error.message);
        if let Some(hint) = user_error.usage_hint {
            output.push_str(&format!("\nHint: {}", hint));
        }
        output
    } else {
        format!("Error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_status_hints_at_csrf() {
        let err = ControlError::Status {
            endpoint: "/__cypress__/migrate/".to_string(),
            status: 403,
            body: "{\"detail\": \"CSRF verification failed.\"}".to_string(),
        };
        let output = format_cli_error(&err);
        assert!(output.starts_with("Error: /__cypress__/migrate/ returned HTTP 403"));
        assert!(output.contains("\nHint: CSRF verification failed."));
    }

    #[test]
    fn unknown_status_has_no_hint() {
        let err = ControlError::Status {
            endpoint: "/__cypress__/manage/".to_string(),
            status: 418,
            body: String::new(),
        };
        assert!(!format_cli_error(&err).contains("Hint:"));
    }

    #[test]
    fn attribute_errors_hint_at_format() {
        let err = AttributeParseError::MissingSeparator("username".to_string());
        let output = format_cli_error(&err);
        assert!(output.contains("key=value"));
    }
}
