use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use django_cypress::{ControlState, Endpoint, cli_utils, create_control_router};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Host to bind the HTTP server")]
    host: Option<String>,
    #[arrrg(optional, "Port to bind the HTTP server")]
    port: Option<u16>,
    #[arrrg(optional, "Requests and tokens kept in memory")]
    log_capacity: Option<usize>,
    #[arrrg(flag, "Enable verbose logging")]
    verbose: bool,
}

const DEFAULT_LOG_CAPACITY: usize = 1024;

const HELP_TEXT: &str = r#"cypress-controld - stand-in Django control channel

USAGE:
    cypress-controld [OPTIONS]

OPTIONS:
    --host <HOST>        Host to bind the HTTP server [default: 127.0.0.1]
    --port <PORT>        Port to bind the HTTP server [default: 8000]
    --log-capacity <N>   Requests and tokens kept in memory [default: 1024]
    --verbose            Enable verbose logging

DESCRIPTION:
    Serves the __cypress__ control endpoints without a Django project.
    Tokens are issued and checked as Django would; commands are accepted
    and logged but not executed. Only the most recent requests and
    tokens are kept; an evicted token is rejected like a forged one.

    The server supports graceful shutdown via Ctrl+C."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = Args::from_command_line("USAGE: cypress-controld [OPTIONS]");

    if !free.is_empty() && free[0] == "help" {
        println!("{}", HELP_TEXT);
        return Ok(());
    }

    let config = ServerConfig::from_args(args);
    cli_utils::init_tracing(config.verbose);

    let state = ControlState::with_log_capacity(config.log_capacity);
    let app = create_control_router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    info!("control server listening on http://{}", addr);
    for endpoint in Endpoint::ALL {
        info!("  {}", endpoint);
    }

    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server error: {}", e);
                std::process::exit(1);
            }
        }
        () = shutdown_signal => {
            info!(
                retained_requests = state.requests().len(),
                retained_tokens = state.issued_tokens().len(),
                "shutdown signal received, stopping"
            );
        }
    }

    Ok(())
}

struct ServerConfig {
    host: String,
    port: u16,
    log_capacity: usize,
    verbose: bool,
}

impl ServerConfig {
    fn from_args(args: Args) -> Self {
        Self {
            host: args.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: args.port.unwrap_or(8000),
            log_capacity: args.log_capacity.unwrap_or(DEFAULT_LOG_CAPACITY),
            verbose: args.verbose,
        }
    }
}
