//! Integration tests for the state websocket

use std::time::Duration;

use futures_util::StreamExt;
use hostctl_coordinator::WsMessage;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::common::{
    KillOnDrop, config_with_hosts, get_free_port, scratch_path, spawn_hostctl_with_config,
    wait_for_listening,
};

#[tokio::test]
async fn test_websocket_streams_reachability_changes() {
    let port = get_free_port();
    let marker = scratch_path(&format!("ws_marker_{port}"));
    drop(std::fs::remove_file(&marker));

    let config = config_with_hosts(
        port,
        &format!(
            r#"
        [hosts.nas]
        address = "{}"
        actions = [{{ name = "wake", command = "true" }}]
        "#,
            marker.display()
        ),
    );
    let child = spawn_hostctl_with_config(port, &config);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;

    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("failed to connect websocket");
    let (_write, mut read) = ws_stream.split();

    // The first message is the full state.
    let initial_msg = read.next().await.unwrap().unwrap();
    let WsMessage::RemoteState(hosts) = serde_json::from_str(&initial_msg.to_string()).unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].name, "nas");
    assert_eq!(hosts[0].actions, ["WAKE"]);
    assert!(!hosts[0].online);

    std::fs::write(&marker, b"").expect("failed to create marker");

    let online = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = read.next().await {
            if let Message::Text(text) = msg.unwrap() {
                let WsMessage::RemoteState(batch) = serde_json::from_str(&text).unwrap();
                if let Some(host) = batch.into_iter().find(|h| h.name == "nas" && h.online) {
                    return host;
                }
            }
        }
        panic!("websocket closed before the host came online");
    })
    .await
    .expect("Timeout waiting for the host to come online");

    assert!(online.last_seen.is_some());
    drop(std::fs::remove_file(&marker));
}
