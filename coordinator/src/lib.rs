//! Library entry for the `hostctl` coordinator.
//!
//! Exposes `inner_main` so the workspace-level shim binary can call into the coordinator logic.
//!
//! Loads the host configuration, starts the reachability poller and serves the
//! remote-control HTTP API.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

mod app;
pub mod cli;
mod config;
mod http;
mod websocket;

// for use in integration tests
pub use http::api::{ControlRequest, ControlResponse, StateResponse, UpdateResponse};
pub use websocket::WsMessage;

use std::env;
use std::fs;
use std::sync::Once;

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("HOSTCTL_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The coordinator's main function; can be called from a shim binary.
///
/// Dispatches the parsed CLI invocation.
///
/// # Errors
///
/// Returns an error if the configuration is missing or invalid, or if the server fails to start.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::ControlService(args) => {
            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            init_tracing(args.log_format);

            // Create a startup span that holds the resolved config path for the lifetime
            // of the coordinator.
            let startup_span = tracing::info_span!("coord.startup", ?config_path, pid=?std::process::id(), version = env!("CARGO_PKG_VERSION"));

            async {
                info!("Starting coordinator");

                // Pass through optional port/bind overrides from CLI
                app::start(&config_path, args.port, args.bind.as_deref()).await
            }
            .instrument(startup_span)
            .await
        }
    }
}
