//! # Fixture Command Handlers
//!
//! One handler per control-channel operation. Each validates its arguments,
//! performs the operation and prints the response body.

use crate::{
    ControlClient, cli_utils,
    commands::shared::{
        dispatch_command, execute_or_exit, exit_with_handled_error, validate_args_count_or_exit,
    },
    parse_attributes,
};

/// Usage text listing every command.
pub const USAGE: &str = r#"Usage: cypressctl [options] <command> [args...]

Options:
  --base-url <url>      Base URL of the Django server (default: $DJANGO_CYPRESS_BASE_URL or http://localhost:8000)
  --output <format>     Output format for responses: json or yaml (default: json)
  --timeout-secs <n>    Per-request timeout in seconds (default: none)
  --verbose             Log every request

Commands:
  csrftoken                          Fetch a CSRF token
  migrate                            Run manage.py migrate
  refresh-database                   Flush the database
  manage <command> [params...]       Run a management command
  create-user <key=value>...         Create a user from attributes"#;

/// Dispatches `args` (first element is the command) to its handler.
pub async fn handle_fixture_command(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    dispatch_command!(USAGE, args, client, output_format, {
        "csrftoken" => handle_csrftoken,
        "migrate" => handle_migrate,
        "refresh-database" => handle_refresh_database,
        "manage" => handle_manage,
        "create-user" => handle_create_user,
    });
}

async fn handle_csrftoken(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    validate_args_count_or_exit(args, 1, 1, "csrftoken", "Usage: cypressctl csrftoken");

    let response = execute_or_exit(|| client.csrf_token()).await;
    cli_utils::print_formatted_or_exit(&response.body, output_format, "token");
}

async fn handle_migrate(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    validate_args_count_or_exit(args, 1, 1, "migrate", "Usage: cypressctl migrate");

    let response = execute_or_exit(|| client.migrate()).await;
    cli_utils::print_formatted_or_exit(&response.body, output_format, "migrate");
}

async fn handle_refresh_database(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    validate_args_count_or_exit(
        args,
        1,
        1,
        "refresh-database",
        "Usage: cypressctl refresh-database",
    );

    let response = execute_or_exit(|| client.refresh_database()).await;
    cli_utils::print_formatted_or_exit(&response.body, output_format, "refresh-database");
}

async fn handle_manage(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    validate_args_count_or_exit(
        args,
        2,
        usize::MAX,
        "manage",
        r#"Usage: cypressctl manage <command> [params...]
Example: cypressctl manage loaddata fixture.json"#,
    );

    let command = args[1].as_str();
    let parameters: Vec<&str> = args[2..].iter().map(String::as_str).collect();

    let response = execute_or_exit(|| client.manage(command, &parameters)).await;
    cli_utils::print_formatted_or_exit(&response.body, output_format, "manage");
}

async fn handle_create_user(
    args: &[String],
    client: &ControlClient,
    output_format: cli_utils::OutputFormat,
) {
    validate_args_count_or_exit(
        args,
        2,
        usize::MAX,
        "create-user",
        r#"Usage: cypressctl create-user <key=value>...
Example: cypressctl create-user username=django-user password=123456789"#,
    );

    let attributes = parse_attributes(&args[1..]).unwrap_or_else(|e| exit_with_handled_error(&e));

    let response = execute_or_exit(|| client.create_user(&attributes)).await;
    cli_utils::print_formatted_or_exit(&response.body, output_format, "create-user");
}
