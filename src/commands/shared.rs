//! # Shared Command Utilities
//!
//! Argument validation and request execution helpers used by every command
//! handler.

use crate::commands::errors::{UserError, format_cli_error};
use crate::{ControlError, ControlResponse, cli_utils};
use handled::Handle;

/// Validates both minimum and maximum argument counts.
///
/// # Arguments
/// * `args` - The command arguments array
/// * `min_count` - The minimum number of arguments required (including the command)
/// * `max_count` - The maximum number of arguments allowed (including the command)
/// * `command` - The command name for error message
/// * `usage` - The usage string to display
pub fn validate_args_count_or_exit(
    args: &[String],
    min_count: usize,
    max_count: usize,
    command: &str,
    usage: &str,
) {
    if args.len() < min_count {
        cli_utils::exit_with_usage_error(
            &format!("{} command requires more arguments", command),
            usage,
        );
    }
    if args.len() > max_count {
        cli_utils::exit_with_usage_error(
            &format!("{} command has too many arguments", command),
            usage,
        );
    }
}

/// Exits with the user-facing rendering of `error`.
pub fn exit_with_handled_error<E>(error: &E) -> !
where
    E: Handle<UserError> + std::fmt::Display,
{
    eprintln!("{}", format_cli_error(error));
    std::process::exit(1);
}

/// Awaits a control-channel operation and exits on error with a hinted message.
pub async fn execute_or_exit<F, Fut>(operation: F) -> ControlResponse
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<ControlResponse, ControlError>>,
{
    match operation().await {
        Ok(response) => response,
        Err(e) => exit_with_handled_error(&e),
    }
}

/// Macro to generate command dispatcher boilerplate.
macro_rules! dispatch_command {
    ($usage:expr, $args:expr, $client:expr, $output_format:expr, {
        $($command:expr => $handler:expr),* $(,)?
    }) => {
        if $args.is_empty() {
            crate::cli_utils::exit_with_usage_error("No command specified", $usage);
        }

        match $args[0].as_str() {
            $(
                $command => $handler($args, $client, $output_format).await,
            )*
            _ => {
                let available_commands = vec![$($command),*];
                crate::cli_utils::exit_with_error(&format!(
                    "Unknown command '{}'. Available commands: {}",
                    $args[0],
                    available_commands.join(", ")
                ));
            }
        }
    };
}

pub(crate) use dispatch_command;
