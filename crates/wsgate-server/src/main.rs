//! wsgate: WebSocket gate server.
//!
//! Accepts WebSocket connections, verifies the token carried by each
//! connection's first frame against an external endpoint, and serves
//! verified sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use wsgate_core::VerificationRequest;
use wsgate_server::auth::{authorize, HttpVerifier};
use wsgate_server::config::{CliOverrides, ServerConfig};
use wsgate_server::server::GateServer;

/// wsgate: WebSocket authorization gate
#[derive(Parser, Debug)]
#[command(name = "wsgate", version, about = "WebSocket authorization gate")]
struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "~/.wsgate/config.toml")]
    config: String,

    /// Verification endpoint URL (overrides the config file)
    #[arg(long, global = true)]
    verify_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gate server
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Verify a token once, with the configured retry policy
    Verify {
        /// Credential token
        #[arg(long)]
        token: String,

        /// Session identifier
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let (bind, port) = match &cli.command {
        Command::Serve { bind, port } => (bind.clone(), *port),
        Command::Verify { .. } => (None, None),
    };
    let overrides = CliOverrides {
        bind,
        port,
        verify_url: cli.verify_url.clone(),
    };

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(Some(&config_path), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Verify { token, id } => verify(config, token, id).await,
    }
}

async fn serve(config: ServerConfig) {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.bind_addr,
        "starting wsgate"
    );

    let server = match GateServer::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("wsgate stopped");
}

async fn verify(config: ServerConfig, token: String, id: String) {
    let verifier = match HttpVerifier::new(config.verify_url.clone(), config.request_timeout) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to create verifier");
            std::process::exit(1);
        }
    };

    let request = VerificationRequest { token, id };
    match authorize(&verifier, &request, &config.session.retry).await {
        Ok(()) => info!(url = %verifier.endpoint(), "token authorized"),
        Err(e) => {
            error!(url = %verifier.endpoint(), error = %e, "token not authorized");
            std::process::exit(1);
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
