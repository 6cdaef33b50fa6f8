//! Integration tests for the remote-control HTTP API

use std::time::Duration;

use hostctl_coordinator::{ControlRequest, ControlResponse, StateResponse};

use crate::common::{
    KillOnDrop, config_with_hosts, get_free_port, scratch_path, spawn_hostctl_with_config,
    spawn_hostctl_with_config_env, wait_for_listening,
};

async fn control(
    client: &reqwest::Client,
    port: u16,
    target: &str,
    action: &str,
) -> reqwest::Response {
    client
        .post(format!("http://127.0.0.1:{port}/remote/control"))
        .json(&ControlRequest {
            target: target.to_owned(),
            action: action.to_owned(),
        })
        .send()
        .await
        .expect("failed to send control request")
}

#[tokio::test]
async fn test_state_and_control() {
    let port = get_free_port();
    let config = config_with_hosts(
        port,
        r#"
        [hosts.nas]
        address = "/nonexistent/hostctl"
        actions = [
            { name = "hello", command = "echo hello" },
            { name = "fail", command = "echo oops >&2; exit 3" },
        ]

        [hosts.printer]
        address = "/nonexistent/hostctl"
        "#,
    );
    let child = spawn_hostctl_with_config(port, &config);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;

    let client = reqwest::Client::new();

    let state: StateResponse = client
        .post(format!("http://127.0.0.1:{port}/remote"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names = state
        .hosts
        .iter()
        .map(|h| h.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["nas", "printer"]);
    assert_eq!(state.hosts[0].actions, ["HELLO", "FAIL"]);
    assert!(state.hosts[1].actions.is_empty());

    let resp = control(&client, port, "nas", "Hello").await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let result: ControlResponse = resp.json().await.unwrap();
    assert_eq!(result.code, Some(0));
    assert_eq!(result.message, "hello\n");
    assert_eq!(result.error, "");

    let resp = control(&client, port, "nas", "fail").await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let result: ControlResponse = resp.json().await.unwrap();
    assert_eq!(result.code, Some(3));
    assert_eq!(result.error, "oops\n");
}

#[tokio::test]
async fn test_control_failures_are_opaque() {
    let port = get_free_port();
    let marker = scratch_path(&format!("never_run_{port}"));
    drop(std::fs::remove_file(&marker));
    let config = config_with_hosts(
        port,
        &format!(
            r#"
        [hosts.nas]
        address = "/nonexistent/hostctl"
        actions = [{{ name = "touch", command = "touch {}" }}]
        "#,
            marker.display()
        ),
    );
    let child = spawn_hostctl_with_config(port, &config);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;

    let client = reqwest::Client::new();
    for (target, action) in [("ghost", "touch"), ("nas", "reboot")] {
        let resp = control(&client, port, target, action).await;
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body = resp.text().await.unwrap();
        assert!(
            !body.contains(target) && !body.contains(action),
            "error body leaks details: {body}"
        );
    }
    assert!(!marker.exists(), "failed lookups must not run anything");
}

#[cfg(unix)]
#[tokio::test]
async fn test_ssh_actions_use_configured_key() {
    use std::os::unix::fs::PermissionsExt as _;

    let port = get_free_port();
    let bin_dir = scratch_path(&format!("fake_ssh_{port}"));
    std::fs::create_dir_all(&bin_dir).unwrap();
    let fake_ssh = bin_dir.join("ssh");
    std::fs::write(&fake_ssh, "#!/bin/sh\necho \"$@\"\n").unwrap();
    std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();

    let path = format!(
        "{}:{}",
        bin_dir.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    let config = config_with_hosts(
        port,
        r#"
        [hosts.nas]
        address = "/nonexistent/hostctl"
        actions = [{ name = "uptime", command = "ssh admin@10.0.0.5 uptime" }]
        "#,
    );
    let child = spawn_hostctl_with_config_env(port, &config, &[("PATH", &path)]);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;

    let client = reqwest::Client::new();
    let resp = control(&client, port, "nas", "uptime").await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let result: ControlResponse = resp.json().await.unwrap();
    assert_eq!(
        result.message,
        "-oStrictHostKeyChecking=no -i /path/key admin@10.0.0.5 uptime\n"
    );

    drop(std::fs::remove_dir_all(&bin_dir));
}

#[tokio::test]
async fn test_update_reports_changes() {
    let port = get_free_port();
    let marker = scratch_path(&format!("update_marker_{port}"));
    drop(std::fs::remove_file(&marker));
    // Long poll interval so only the explicit update observes the change.
    let config = config_with_hosts(
        port,
        &format!(
            r#"
        [hosts.nas]
        address = "{}"
        "#,
            marker.display()
        ),
    )
    .replace("timeout = 1\n", "timeout = 3600\n");
    let child = spawn_hostctl_with_config(port, &config);
    let _guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;

    // let the poller finish its first round
    tokio::time::sleep(Duration::from_millis(500)).await;
    std::fs::write(&marker, b"").unwrap();

    let client = reqwest::Client::new();
    let update: serde_json::Value = client
        .post(format!("http://127.0.0.1:{port}/remote/update"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let changed = update["update"].as_array().expect("update list");
    assert_eq!(changed.len(), 1, "{update}");
    assert_eq!(changed[0]["name"], "nas");
    assert_eq!(changed[0]["online"], true);
    assert!(changed[0]["last_seen"].as_f64().unwrap() > 0.0);

    drop(std::fs::remove_file(&marker));
}
