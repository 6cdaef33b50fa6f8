//! Background polling tasks for the coordinator.

use futures::StreamExt as _;
use tracing::{Instrument as _, debug, info, warn};

use crate::{app::AppState, websocket::WsMessage};

/// Start all background tasks for the HTTP server.
pub(super) fn start_background_tasks(state: &AppState) {
    // Drives the reachability poll loop and forwards every change batch to
    // the websocket client loops
    {
        let state = state.clone();
        tokio::spawn(
            async move {
                forward_state_changes(state).await;
            }
            .instrument(tracing::info_span!("coord.poll")),
        );
    }
}

/// Consumes the controller's poll stream for the lifetime of the process.
///
/// Host records are updated by the stream itself; this only fans the batches out.
async fn forward_state_changes(state: AppState) {
    let mut changes = state.controller.poll_state();
    info!("Reachability polling started");

    while let Some(batch) = changes.next().await {
        if state.ws_tx.send(WsMessage::RemoteState(batch)).is_err() {
            debug!("No Websocket Subscribers");
        }
    }

    warn!("Reachability polling stopped unexpectedly");
}
