//! # BingMux - Bing Chat to OpenAI Bridge Server
//!
//! A gateway that exposes the Bing Chat duplex streaming protocol as an
//! OpenAI-compatible chat completions API.
//!
//! ## Features
//!
//! - **OpenAI-compatible API**: `POST /v1/chat/completions` (also `POST /`)
//! - **Streaming Support**: Server-Sent Events with suffix deltas
//! - **Anonymous sessions**: upstream cookies acquired lazily and refreshed on every call
//! - **Stable error taxonomy**: upstream failures classified into a closed set of kinds
//! - **Layered configuration**: TOML files plus environment overrides
//!
//! ## Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/v1/chat/completions \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "model": "precise",
//!     "messages": [{"role": "user", "content": "Hello!"}],
//!     "stream": false
//!   }'
//! ```
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp
//!

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;

use axum::Router;
use bingmux::config::cli::ConfigCli;
use bingmux::config::{Config, paths};
use bingmux::error::{ProxyError, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the BingMux server.
///
/// Handles CLI commands, loads the layered configuration, initializes logging
/// and serves the router until shutdown.
#[tokio::main]
async fn main() {
    // Handle CLI arguments before config loading
    handle_cli_args();

    if let Err(e) = run().await {
        // Print error message line by line to ensure proper formatting
        let error_msg = format!("{}", e);
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    initialize_logging(&config);

    let app = bingmux::create_app(config.clone()).await?;
    start_server(&config, app).await
}

///
/// Handle command line arguments like --version and --help before config loading.
///
/// This ensures these commands work even without a valid configuration.
fn handle_cli_args() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return; // No arguments, proceed with normal startup
    }

    match args[1].as_str() {
        "--version" | "-V" => {
            println!("bingmux {}", VERSION);
            std::process::exit(0);
        }
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        "config" => {
            let sub = args.get(2).map(String::as_str);
            let force = args.iter().skip(3).any(|a| a == "--force" || a == "-f");
            let outcome = match sub {
                Some("init") => ConfigCli::init(force),
                Some("show") => ConfigCli::show(),
                Some("validate") => ConfigCli::validate(),
                _ => {
                    eprintln!("Error: expected one of: init [--force], show, validate");
                    eprintln!("Usage: bingmux config <init|show|validate>");
                    std::process::exit(1);
                }
            };
            match outcome {
                Ok(()) => std::process::exit(0),
                Err(e) => {
                    eprintln!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            }
        }
        other => {
            if other.starts_with('-') {
                eprintln!("Error: Unknown option: {}", other);
            } else {
                eprintln!("Error: Unknown command: {}", other);
            }
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    }
}

///
/// Print help information for the BingMux CLI.
fn print_help() {
    let user_config = paths::user_config_file()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "<unavailable>".to_string());

    println!("BingMux v{}", VERSION);
    println!("Bing Chat to OpenAI-compatible chat completions bridge");
    println!();
    println!("USAGE:");
    println!("    bingmux [COMMAND] [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    config init [--force]   Write an example config to {}", user_config);
    println!("    config show             Print the effective configuration");
    println!("    config validate         Validate the configuration and exit");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help              Print help information");
    println!("    -V, --version           Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    BINGMUX_CONFIG                   Explicit config file path");
    println!("    BINGMUX_SERVER_PORT              Server port (default: 3000)");
    println!("    BINGMUX_SERVER_LOG_LEVEL         trace, debug, info, warn, error");
    println!("    BINGMUX_SERVER_API_KEY           Bearer credential required from callers");
    println!("    BINGMUX_UPSTREAM_ENDPOINT        Upstream site (default: https://www.bing.com)");
    println!("    BINGMUX_UPSTREAM_CHATHUB_URL     Duplex endpoint");
    println!("    BINGMUX_UPSTREAM_USER_AGENT      Outbound identification string");
    println!("    BINGMUX_STREAMING_MODE           auto, never, always (default: auto)");
    println!("    RUST_LOG                         Overrides the configured log level");
    println!();
    println!("EXAMPLES:");
    println!("    bingmux                     Start the bridge");
    println!("    bingmux config init         Create a user config file");
}

///
/// Initialize logging.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies.
///
/// # Arguments
///  * `config` - application configuration containing log level settings
fn initialize_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.as_filter()));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

///
/// Start the HTTP server and log startup information.
///
/// # Arguments
///  * `config` - application configuration
///  * `app` - configured Axum application
///
/// # Returns
///  * `Ok(())` when server shuts down gracefully
///  * `ProxyError::Http` if server binding or startup fails
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await.map_err(|e| {
        let error_msg = format!("Failed to bind to port {}: {}", port, e);
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ProxyError::Http(format!(
                "{}\n\n\
                Port {} is already in use. Either stop the other process\n\
                (lsof -i :{}) or pick another port:\n\
                   export BINGMUX_SERVER_PORT=3001",
                error_msg, port, port
            ))
        } else {
            ProxyError::Http(error_msg)
        }
    })?;

    log_startup_info(config);

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Http(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
///
/// # Arguments
///  * `config` - application configuration
fn log_startup_info(config: &Config) {
    info!("BingMux v{} running on port {}", VERSION, config.server.port);
    info!("Upstream: {} (ChatHub {})", config.upstream.base_url(), config.upstream.chathub_url);
    info!("OpenAI-compatible endpoint: http://localhost:{}/v1", config.server.port);

    if config.server.api_key.is_none() {
        info!("No API key configured; requests are not authenticated");
    }
}
