//! Host registry and controller: state snapshots, action execution and the
//! change-detecting poll loop.

use alloc::sync::Arc;
use core::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use std::collections::HashMap;

use futures::{Stream, future};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument as _, debug, info};

use crate::{
    encoding::TextEncoding,
    error::{DecodeError, RemoteError, Result},
    exec,
    host::{HostRecord, HostSnapshot, HostSpec},
    waiter::Waiter,
};

/// Default reachability check: two pings half a second apart, two seconds overall.
pub const DEFAULT_PROBE_COMMAND: &str = "ping -i 0.5 -c 2 -w 2 {address}";
/// Hard ceiling for a single probe, slightly above the ping deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Batches buffered for a slow poll consumer before the loop waits on it.
const POLL_CHANNEL_CAPACITY: usize = 16;

/// How reachability is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Shell command template; `{address}` is replaced with the host address.
    pub command: String,
    /// The probe is killed and counted as unreachable after this long.
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_PROBE_COMMAND.to_owned(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Fully-resolved inputs for [`Controller::new`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub hosts: Vec<HostSpec>,
    /// Longest sleep between poll cycles when nobody wakes the loop.
    pub timeout: Duration,
    /// Private key passed to every `ssh` action.
    pub ssh_key: String,
    pub probe: ProbeSettings,
    /// Optional bound on action runtime. `None` lets actions run indefinitely.
    pub action_timeout: Option<Duration>,
}

/// Exit code and decoded output streams of a completed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Sole owner of the host records.
#[derive(Debug)]
pub struct Controller {
    hosts: Vec<HostRecord>,
    by_name: HashMap<String, usize>,
    timeout: Duration,
    ssh_key: String,
    probe: ProbeSettings,
    action_timeout: Option<Duration>,
    waiter: Waiter,
}

impl Controller {
    /// Builds the registry. All hosts start offline.
    ///
    /// # Errors
    ///
    /// Fails on duplicate host names or invalid action definitions.
    pub fn new(settings: ControllerSettings) -> Result<Self> {
        let ControllerSettings {
            hosts: specs,
            timeout,
            ssh_key,
            probe,
            action_timeout,
        } = settings;

        let mut hosts = Vec::with_capacity(specs.len());
        let mut by_name = HashMap::with_capacity(specs.len());
        for spec in specs {
            if by_name.contains_key(&spec.name) {
                return Err(RemoteError::DuplicateHost(spec.name));
            }
            by_name.insert(spec.name.clone(), hosts.len());
            hosts.push(HostRecord::new(spec)?);
        }

        Ok(Self {
            hosts,
            by_name,
            timeout,
            ssh_key,
            probe,
            action_timeout,
            waiter: Waiter::new(),
        })
    }

    pub fn hosts(&self) -> impl ExactSizeIterator<Item = &HostRecord> {
        self.hosts.iter()
    }

    #[must_use]
    pub fn host(&self, name: &str) -> Option<&HostRecord> {
        self.by_name.get(name).and_then(|&idx| self.hosts.get(idx))
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Snapshot of every registered host, in registration order.
    #[must_use]
    pub fn get_state(&self) -> Vec<HostSnapshot> {
        self.hosts.iter().map(HostRecord::state).collect()
    }

    /// Runs a host's action and returns its exit code and decoded output.
    ///
    /// Templates starting with `ssh` are rewritten to use the configured key.
    /// Without an action timeout this waits as long as the command runs.
    ///
    /// # Errors
    ///
    /// * [`RemoteError::UnknownHost`] / [`RemoteError::UnknownAction`] before anything is spawned
    /// * [`RemoteError::ProcessSpawnFailure`] if the shell could not be started or awaited
    /// * [`RemoteError::ActionTimeout`] if the configured action timeout expired
    /// * [`RemoteError::DecodeFailure`] if output is invalid in the host's encoding
    #[tracing::instrument(skip(self), err(Display))]
    pub async fn perform(&self, hostname: &str, action: &str) -> Result<ActionOutput> {
        let host = self
            .host(hostname)
            .ok_or_else(|| RemoteError::UnknownHost(hostname.to_owned()))?;
        let template = host.resolve_action(action)?;
        let command = exec::compose_command(template, &self.ssh_key);

        info!(host = %hostname, %action, "Performing action");
        let captured = exec::run_captured(&command, self.action_timeout).await?;
        debug!(code = ?captured.code, "Action finished");

        let encoding = host.encoding();
        let decode = |bytes: &[u8]| {
            encoding
                .decode(bytes)
                .map_err(|source| decode_failure(&command, encoding, source))
        };
        Ok(ActionOutput {
            code: captured.code,
            stdout: decode(&captured.stdout)?,
            stderr: decode(&captured.stderr)?,
        })
    }

    /// Probes every host concurrently and returns snapshots of those whose
    /// `online` flag flipped.
    ///
    /// Running the probes in parallel keeps a cycle at roughly one probe
    /// timeout regardless of the number of hosts.
    pub async fn update_once(&self) -> Vec<HostSnapshot> {
        let probes = self.hosts.iter().map(|host| async move {
            host.probe(&self.probe).await.then(|| host.state())
        });
        future::join_all(probes).await.into_iter().flatten().collect()
    }

    /// Cuts the current (or next) wait between poll cycles short.
    pub fn wake(&self) {
        self.waiter.notify();
    }

    /// Starts an independent poll loop and returns the stream of changed-host batches.
    ///
    /// Only non-empty batches are emitted. Dropping the stream stops the loop
    /// and kills any probe still running.
    #[must_use]
    pub fn poll_state(self: &Arc<Self>) -> StateStream {
        let (tx, rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
        let controller = Arc::clone(self);
        let task = tokio::spawn(
            async move {
                controller.poll_loop(tx).await;
            }
            .in_current_span(),
        );
        StateStream { rx, task }
    }

    async fn poll_loop(&self, tx: mpsc::Sender<Vec<HostSnapshot>>) {
        loop {
            let changed = self.update_once().await;
            if changed.is_empty() {
                debug!("No change in host reachability");
            } else {
                info!(
                    hosts = ?changed.iter().map(|h| (&h.name, h.online)).collect::<Vec<_>>(),
                    "Host reachability changed"
                );
                if tx.send(changed).await.is_err() {
                    debug!("Poll consumer dropped, stopping");
                    return;
                }
            }

            tokio::select! {
                () = self.waiter.wait(self.timeout) => {}
                () = tx.closed() => {
                    debug!("Poll consumer dropped, stopping");
                    return;
                }
            }
        }
    }
}

fn decode_failure(
    command: &str,
    encoding: TextEncoding,
    source: DecodeError,
) -> RemoteError {
    RemoteError::DecodeFailure {
        command: command.to_owned(),
        encoding: encoding.name(),
        source,
    }
}

/// Stream of changed-host batches produced by [`Controller::poll_state`].
///
/// The backing task is aborted when the stream is dropped.
#[derive(Debug)]
pub struct StateStream {
    rx: mpsc::Receiver<Vec<HostSnapshot>>,
    task: JoinHandle<()>,
}

impl StateStream {
    /// Waits for the next batch. Returns `None` only if the loop ended.
    pub async fn next_batch(&mut self) -> Option<Vec<HostSnapshot>> {
        self.rx.recv().await
    }

    /// Stops the loop and waits until it has fully unwound, killing any
    /// in-flight probe.
    pub async fn cancel(mut self) {
        self.task.abort();
        drop((&mut self.task).await);
    }
}

impl Stream for StateStream {
    type Item = Vec<HostSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for StateStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
