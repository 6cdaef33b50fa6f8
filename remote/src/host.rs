//! Host records: identity, validated actions and probed reachability.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use crate::{
    controller::ProbeSettings,
    encoding::TextEncoding,
    error::{RemoteError, Result},
    exec::{self, StatusOutcome},
};

/// One `(name, command template)` pair as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub command: String,
}

/// Fully-resolved description of a host, used to build a [`HostRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
    pub address: String,
    pub encoding: TextEncoding,
    pub actions: Vec<ActionSpec>,
}

/// Upper-cased action names mapped to their command templates, in definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap {
    entries: Vec<(String, String)>,
}

impl ActionMap {
    /// Validates and normalizes action definitions.
    ///
    /// Actions with an empty command are treated as disabled and left out.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidAction`] for an empty name or a name that
    /// repeats another one case-insensitively.
    pub fn new(host: &str, specs: impl IntoIterator<Item = ActionSpec>) -> Result<Self> {
        let invalid = |reason: String| RemoteError::InvalidAction {
            host: host.to_owned(),
            reason,
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for ActionSpec { name, command } in specs {
            let name = name.trim().to_uppercase();
            if name.is_empty() {
                return Err(invalid("action name must not be empty".to_owned()));
            }
            if !seen.insert(name.clone()) {
                return Err(invalid(format!("action '{name}' is defined more than once")));
            }
            if command.trim().is_empty() {
                debug!(%host, action = %name, "Skipping action with empty command");
                continue;
            }
            entries.push((name, command));
        }
        Ok(Self { entries })
    }

    /// Looks up a template; `name` is matched case-insensitively.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let name = name.to_uppercase();
        self.entries
            .iter()
            .find(|&&(ref key, _)| *key == name)
            .map(|&(_, ref command)| command.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|&(ref name, _)| name.as_str())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Probed reachability. Both fields are always replaced together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reachability {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Point-in-time view of a host, as served to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub name: String,
    pub online: bool,
    /// Fractional UNIX seconds of the last reachable probe, `0` if never seen.
    #[serde(with = "unix_seconds")]
    pub last_seen: Option<DateTime<Utc>>,
    pub actions: Vec<String>,
}

mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize as _, Deserializer, Serializer};

    #[expect(clippy::cast_precision_loss, reason = "microsecond timestamps fit in f64")]
    pub(super) fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let seconds = value.map_or(0.0, |t| t.timestamp_micros() as f64 / 1_000_000.0);
        serializer.serialize_f64(seconds)
    }

    #[expect(clippy::cast_possible_truncation, reason = "rounded to whole microseconds")]
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if seconds <= 0.0 {
            return Ok(None);
        }
        let micros = (seconds * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// A managed host and its current reachability.
#[derive(Debug)]
pub struct HostRecord {
    name: String,
    address: String,
    encoding: TextEncoding,
    actions: ActionMap,
    reachability: watch::Sender<Reachability>,
    /// Serializes probes of this host.
    probe_lock: Mutex<()>,
}

impl HostRecord {
    /// Builds a record in the initial offline, never-seen state.
    ///
    /// # Errors
    ///
    /// Returns an error if the action definitions are invalid.
    pub fn new(spec: HostSpec) -> Result<Self> {
        let actions = ActionMap::new(&spec.name, spec.actions)?;
        let (reachability, _) = watch::channel(Reachability::default());
        Ok(Self {
            name: spec.name,
            address: spec.address,
            encoding: spec.encoding,
            actions,
            reachability,
            probe_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    #[must_use]
    pub fn reachability(&self) -> Reachability {
        *self.reachability.borrow()
    }

    /// Subscribe to reachability updates of this host.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.reachability.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> HostSnapshot {
        let Reachability { online, last_seen } = self.reachability();
        HostSnapshot {
            name: self.name.clone(),
            online,
            last_seen,
            actions: self.actions.names().map(ToOwned::to_owned).collect(),
        }
    }

    /// # Errors
    ///
    /// Returns [`RemoteError::UnknownAction`] if no enabled action has this name.
    pub fn resolve_action(&self, action: &str) -> Result<&str> {
        self.actions
            .resolve(action)
            .ok_or_else(|| RemoteError::UnknownAction {
                host: self.name.clone(),
                action: action.to_owned(),
            })
    }

    /// Runs one reachability check and returns whether `online` flipped.
    ///
    /// Failing to start the probe or exceeding its time limit counts as unreachable.
    pub async fn probe(&self, settings: &ProbeSettings) -> bool {
        let _guard = self.probe_lock.lock().await;
        let command = exec::probe_command(&settings.command, &self.address);

        let online = match exec::run_status(&command, settings.timeout).await {
            Ok(StatusOutcome::Exited(status)) => status.success(),
            Ok(StatusOutcome::TimedOut) => {
                debug!(host = %self.name, timeout = ?settings.timeout, "Probe timed out");
                false
            }
            Err(e) => {
                warn!(host = %self.name, error = %e, "Probe failed, treating host as unreachable");
                false
            }
        };
        debug!(host = %self.name, address = %self.address, online, "Probed host");

        self.record_probe(online, Utc::now())
    }

    /// Applies a probe result observed at `now`; returns whether `online` changed.
    pub(crate) fn record_probe(&self, online: bool, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        self.reachability.send_modify(|state| {
            changed = state.online != online;
            state.online = online;
            if online {
                // never move backwards, even if the wall clock does
                state.last_seen = Some(state.last_seen.map_or(now, |prev| prev.max(now)));
            }
        });
        changed
    }
}
