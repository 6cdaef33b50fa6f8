//! Configuration data types and structures for the coordinator.
//!
//! This module contains all the data structures used for configuration,
//! including server binding, poll timing, probe and host/action settings.

use core::time::Duration;
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use hostctl_remote::{
    ActionSpec, ControllerSettings, DEFAULT_PROBE_COMMAND, DEFAULT_PROBE_TIMEOUT, HostSpec,
    ProbeSettings, TextEncoding,
};
use serde::Deserialize;

/// Root of the coordinator configuration file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub(crate) struct ControllerConfig {
    pub server: ServerConfig,
    /// Poll timing, probe and SSH settings.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Managed hosts keyed by their unique name.
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,
}

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub(crate) struct ServerConfig {
    /// TCP port for the control service.
    pub port: u16,
    /// Bind address for the HTTP listener.
    pub bind: String,
}

/// Settings shared by every host.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct RemoteConfig {
    /// Longest pause between poll cycles, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub timeout: u64,
    /// SSH private key used for every `ssh` action.
    /// Relative paths are resolved relative to the config file.
    #[serde(default)]
    pub ssh_key: String,
    /// Optional upper bound for action runtime, in seconds.
    /// Without it an action may block its request indefinitely.
    #[serde(default)]
    pub action_timeout: Option<u64>,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout: default_poll_timeout(),
            ssh_key: String::new(),
            action_timeout: None,
            probe: ProbeConfig::default(),
        }
    }
}

/// Reachability check configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct ProbeConfig {
    /// Shell command template, `{address}` is replaced by the host address.
    #[serde(default = "default_probe_command")]
    pub command: String,
    /// Hard ceiling for one probe in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command: default_probe_command(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// A managed host.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub(crate) struct Host {
    /// Address handed to the probe. May be empty, the probe then simply fails.
    #[serde(default)]
    pub address: String,
    /// Encoding used to decode action output.
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Actions in definition order.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

const fn default_poll_timeout() -> u64 {
    10
}

fn default_probe_command() -> String {
    DEFAULT_PROBE_COMMAND.to_string()
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the default is a few seconds"
)]
const fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

impl ControllerConfig {
    /// Rejects settings that parse but cannot work.
    ///
    /// A zero poll timeout would turn the poll loop into a busy loop whenever
    /// probes fail fast.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending key.
    pub(crate) fn validate(&self) -> eyre::Result<()> {
        eyre::ensure!(
            self.remote.timeout > 0,
            "`remote.timeout` must be at least 1 second"
        );
        eyre::ensure!(
            self.remote.probe.timeout_ms > 0,
            "`remote.probe.timeout_ms` must be positive"
        );
        eyre::ensure!(
            self.remote.action_timeout != Some(0),
            "`remote.action_timeout` must be at least 1 second when set"
        );
        Ok(())
    }

    /// Turns the file representation into the settings the controller is built from.
    ///
    /// `config_path` anchors a relative `ssh_key`.
    pub(crate) fn controller_settings(&self, config_path: &Path) -> ControllerSettings {
        let ssh_key = if self.remote.ssh_key.is_empty() {
            String::new()
        } else {
            resolve_config_relative_paths(config_path, &self.remote.ssh_key)
                .display()
                .to_string()
        };

        ControllerSettings {
            hosts: self
                .hosts
                .iter()
                .map(|(name, host)| HostSpec {
                    name: name.clone(),
                    address: host.address.clone(),
                    encoding: host.encoding,
                    actions: host.actions.clone(),
                })
                .collect(),
            timeout: Duration::from_secs(self.remote.timeout),
            ssh_key,
            probe: ProbeSettings {
                command: self.remote.probe.command.clone(),
                timeout: Duration::from_millis(self.remote.probe.timeout_ms),
            },
            action_timeout: self.remote.action_timeout.map(Duration::from_secs),
        }
    }
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
///
/// # Arguments
///
/// * `config_path` - Path to the config file
/// * `relative_path` - Path to resolve (may be absolute or relative)
///
/// # Returns
///
/// A normalized absolute path
pub(crate) fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // We can't use canonicalize() because the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}
