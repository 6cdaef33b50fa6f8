use alloc::string;
use core::net::{IpAddr, SocketAddr};
use std::path::Path;

use eyre::WrapErr as _;
use tokio::{net, signal};

use crate::{app::state::initialize_state, http::server::router};

/// Creates a future that resolves when a shutdown signal is received.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler, falling back to Ctrl-C: {e}");
                drop(signal::ctrl_c().await);
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Start the HTTP server on the given address until a shutdown signal arrives.
async fn start_server(app: router::App, addr: SocketAddr) -> eyre::Result<()> {
    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err(format!("Failed to bind to {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        res = server => res?,
        () = shutdown_signal() => {
            tracing::info!("Received shutdown, shutting down");
        }
    }

    Ok(())
}

/// Loads the config, builds the host registry, starts polling and serves the API.
///
/// # Returns
///
/// `Ok(())` when the server runs until termination, or an error if binding or setup fails.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid, or the server cannot bind.
pub(crate) async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    tracing::info!("Starting HTTP server...");

    let (app_state, server_config) = initialize_state(config_path).await?;

    // Apply optional overrides from CLI/tests
    let listen_port = port_override.unwrap_or(server_config.port);
    let bind_str = bind_override.map_or_else(
        || server_config.bind.clone(),
        string::ToString::to_string,
    );

    let listen_ip: IpAddr = bind_str
        .parse()
        .wrap_err(format!("Invalid bind address: {bind_str}"))?;

    start_server(
        router::create_app(app_state),
        SocketAddr::from((listen_ip, listen_port)),
    )
    .await
}
