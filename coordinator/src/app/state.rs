use alloc::sync::Arc;
use std::path::Path;

use eyre::WrapErr as _;
use hostctl_remote::Controller;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    app::runtime::start_background_tasks,
    config::{ControllerConfig, ServerConfig, load},
    websocket::WsMessage,
};

type WsTx = broadcast::Sender<WsMessage>;

/// Application state shared across request handlers and background tasks.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Owner of all host records.
    pub controller: Arc<Controller>,

    /// Broadcast sender for distributing WebSocket messages.
    pub ws_tx: WsTx,
}

impl AppState {
    /// Wraps a controller without starting any background task.
    pub(crate) fn new(controller: Controller) -> Self {
        let (ws_tx, _) = broadcast::channel(32);
        Self {
            controller: Arc::new(controller),
            ws_tx,
        }
    }
}

/// Emit startup warnings based on configuration.
fn emit_startup_warnings(config: &ControllerConfig, config_path: &Path, ssh_key: &str) {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt as _;
        if let Ok(metadata) = fs::metadata(config_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o022 != 0 {
                tracing::warn!(
                    "Config file is writable by other users (current: {mode:#o}). Anyone who can edit it can run commands as this service. Run 'chmod 600 {}'.",
                    config_path.display()
                );
            }
        }
    }

    let uses_ssh = config
        .hosts
        .values()
        .flat_map(|host| &host.actions)
        .any(|action| action.command.split_whitespace().next() == Some("ssh"));
    if uses_ssh {
        if ssh_key.is_empty() {
            tracing::warn!("SSH actions are configured but `remote.ssh_key` is not set");
        } else if !Path::new(ssh_key).exists() {
            tracing::warn!(%ssh_key, "Configured SSH key does not exist");
        }
    }

    if config.remote.action_timeout.is_none() {
        tracing::debug!("No action timeout configured, a hanging action blocks its request indefinitely");
    }
}

/// Initialize application state and start background tasks.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_state(config_path: &Path) -> eyre::Result<(AppState, ServerConfig)> {
    let config = load(config_path).await?;
    let settings = config.controller_settings(config_path);

    emit_startup_warnings(&config, config_path, &settings.ssh_key);

    let controller = Controller::new(settings).wrap_err(format!(
        "Invalid host configuration in: {}",
        config_path.display()
    ))?;
    info!(
        hosts = controller.hosts().len(),
        poll_timeout = ?controller.timeout(),
        "Host registry initialized"
    );

    let app_state = AppState::new(controller);

    // Start background tasks now that the full AppState is available.
    start_background_tasks(&app_state);

    Ok((app_state, config.server))
}

