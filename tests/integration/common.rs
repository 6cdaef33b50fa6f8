//! Common utilities for integration tests.
//!
//! This module provides shared functions and types used across multiple integration test modules,
//! such as spawning the service, managing ports, and waiting for it to be ready.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

fn get_hostctl_bin() -> &'static str {
    env!("CARGO_BIN_EXE_hostctl")
}

/// A per-test scratch path under the system temp dir.
pub fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("hostctl_it_{}_{name}", std::process::id()))
}

/// Writes the config to a temp file and spawns the service with it.
pub fn spawn_hostctl_with_config(port: u16, config_toml: &str) -> Child {
    spawn_hostctl_with_config_env(port, config_toml, &[])
}

/// Like [`spawn_hostctl_with_config`], with extra environment variables.
pub fn spawn_hostctl_with_config_env(port: u16, config_toml: &str, envs: &[(&str, &str)]) -> Child {
    let tmp = std::env::temp_dir().join(format!("hostctl_integration_config_{port}.toml"));
    std::fs::write(&tmp, config_toml).expect("failed to write config");

    spawn_hostctl_with_config_file(&tmp, envs)
}

/// Spawn the service from a given config file path.
pub fn spawn_hostctl_with_config_file(config_path: &Path, envs: &[(&str, &str)]) -> Child {
    let mut cmd = Command::new(get_hostctl_bin());
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.env("HOSTCTL_INTEGRATION_TEST", "1")
        .args(["control-service", "--config", config_path.to_str().unwrap()])
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start hostctl")
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
        if start.elapsed() > Duration::from_secs(timeout_secs) {
            panic!("server did not start within timeout");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Minimal config with a fast, file-based probe: a host is reachable while
/// the file named by its address exists.
pub fn config_with_hosts(port: u16, hosts: &str) -> String {
    format!(
        r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [remote]
        timeout = 1
        ssh_key = "/path/key"

        [remote.probe]
        command = "test -e {{address}}"
        timeout_ms = 2000

        {hosts}
        "#
    )
}
