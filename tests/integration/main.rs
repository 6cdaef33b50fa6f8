//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

mod common;
mod remote;
mod websocket;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::time::Duration;

use common::{KillOnDrop, get_free_port, spawn_hostctl_with_config, wait_for_listening};

#[tokio::test]
async fn test_coordinator_config_loads() {
    let port = get_free_port();
    let child = spawn_hostctl_with_config(
        port,
        &format!(
            r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [hosts]
        "#
        ),
    );
    let mut drop_guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;
    drop(drop_guard.0.kill());
    let status = drop_guard.0.wait().expect("failed to wait on child");
    #[cfg(unix)]
    assert!(
        status.success() || status.code() == Some(0) || status.signal() == Some(9),
        "Process did not start or exit as expected"
    );
    #[cfg(not(unix))]
    assert!(
        status.success() || status.code() == Some(0),
        "Process did not start or exit as expected"
    );
}

#[tokio::test]
async fn test_invalid_actions_abort_startup() {
    let port = get_free_port();
    let child = spawn_hostctl_with_config(
        port,
        &format!(
            r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [hosts.nas]
        actions = [
            {{ name = "wake", command = "true" }},
            {{ name = "WAKE", command = "false" }},
        ]
        "#
        ),
    );
    let mut guard = KillOnDrop(child);

    let mut status = None;
    for _ in 0..50 {
        if let Some(exit) = guard.0.try_wait().expect("failed to poll child") {
            status = Some(exit);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let status = status.expect("service should refuse duplicate action names");
    assert!(!status.success(), "startup must fail: {status:?}");
}
