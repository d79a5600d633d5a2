use std::time::Duration;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use django_cypress::{
    ClientConfig, ControlClient,
    cli_utils::{self, OutputFormat},
    commands::{USAGE, handle_fixture_command, shared::exit_with_handled_error},
};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Options {
    #[arrrg(optional, "Base URL of the Django server")]
    base_url: String,
    #[arrrg(optional, "Output format for responses: json or yaml (default: json)")]
    output: String,
    #[arrrg(optional, "Per-request timeout in seconds")]
    timeout_secs: Option<u64>,
    #[arrrg(flag, "Log every request")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (options, free) =
        Options::from_command_line_relaxed("USAGE: cypressctl <command> [args...]");

    if free.is_empty() {
        cli_utils::exit_with_usage_error("No command specified", USAGE);
    }

    cli_utils::init_tracing(options.verbose);

    let output = if options.output.is_empty() {
        OutputFormat::default()
    } else {
        options
            .output
            .parse()
            .unwrap_or_else(|e: String| cli_utils::exit_with_error(&e))
    };

    let mut config = ClientConfig::resolve(Some(options.base_url));
    if let Some(secs) = options.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let client = ControlClient::with_config(config).unwrap_or_else(|e| exit_with_handled_error(&e));

    handle_fixture_command(&free, &client, output).await;

    Ok(())
}
