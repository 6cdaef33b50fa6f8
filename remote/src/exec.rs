//! Child process helpers: command composition, shell spawning and output capture.
//!
//! Every shell is spawned as the leader of its own process group and with
//! `kill_on_drop`. Dropping a pending future (timeout, task abort) kills the
//! whole group, including anything the shell forked, and leaves reaping to tokio.

use alloc::borrow::Cow;
use core::time::Duration;
use std::{
    io,
    process::{ExitStatus, Stdio},
};

use tokio::{
    process::{Child, Command},
    time::timeout,
};
use tracing::debug;

use crate::error::{RemoteError, Result};

/// Placeholder replaced with the host address in probe templates.
pub const ADDRESS_PLACEHOLDER: &str = "{address}";

/// Raw result of a finished command.
#[derive(Debug)]
pub(crate) struct Captured {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Rewrites SSH-shaped templates to always use the configured key and skip
/// host key verification.
///
/// Only a template whose first whitespace-delimited token is exactly `ssh` is
/// rewritten; the remainder is kept verbatim apart from surrounding whitespace.
#[must_use]
pub fn compose_command<'template>(template: &'template str, ssh_key: &str) -> Cow<'template, str> {
    const SSH_OPTIONS: &str = "-oStrictHostKeyChecking=no";
    let trimmed = template.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some(("ssh", rest)) => Cow::Owned(format!("ssh {SSH_OPTIONS} -i {ssh_key} {rest}")),
        None if trimmed == "ssh" => Cow::Owned(format!("ssh {SSH_OPTIONS} -i {ssh_key}")),
        _ => Cow::Borrowed(template),
    }
}

/// Fills the address into a probe template.
#[must_use]
pub fn probe_command(template: &str, address: &str) -> String {
    template.replace(ADDRESS_PLACEHOLDER, address)
}

fn shell(command: &str) -> Command {
    const IS_WINDOWS: bool = cfg!(target_os = "windows");

    let mut cmd = Command::new(if IS_WINDOWS { "pwsh" } else { "sh" });
    cmd.arg(if IS_WINDOWS { "-Command" } else { "-c" })
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Kills the process group led by a spawned shell when dropped, unless disarmed.
#[derive(Debug)]
struct GroupGuard {
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl GroupGuard {
    fn new(child: &Child) -> Self {
        #[cfg(unix)]
        {
            Self {
                pgid: child
                    .id()
                    .and_then(|id| i32::try_from(id).ok())
                    .map(nix::unistd::Pid::from_raw),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child;
            Self {}
        }
    }

    /// The command finished on its own; leave whatever it started alone.
    fn disarm(&mut self) {
        #[cfg(unix)]
        {
            self.pgid = None;
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            use nix::sys::signal::{Signal, killpg};

            // ESRCH only means every member is gone already
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!(%pgid, error = %e, "Process group not killed");
            }
        }
    }
}

fn spawn_failure(command: &str, source: io::Error) -> RemoteError {
    RemoteError::ProcessSpawnFailure {
        command: command.to_owned(),
        source,
    }
}

/// Runs `command` through the shell and captures both output streams.
///
/// With a `limit`, a command still running when it expires is killed together
/// with its descendants and [`RemoteError::ActionTimeout`] is returned.
pub(crate) async fn run_captured(command: &str, limit: Option<Duration>) -> Result<Captured> {
    let child = shell(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_failure(command, e))?;
    let mut group = GroupGuard::new(&child);
    debug!(pid = ?child.id(), %command, "Spawned action");

    let output = match limit {
        Some(limit) => timeout(limit, child.wait_with_output())
            .await
            .map_err(|_elapsed| RemoteError::ActionTimeout {
                command: command.to_owned(),
                timeout: limit,
            })?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| spawn_failure(command, e))?;
    group.disarm();

    Ok(Captured {
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Outcome of a status-only command run.
#[derive(Debug)]
pub(crate) enum StatusOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// Runs `command` discarding its output, killing it and its descendants once
/// `limit` passes.
pub(crate) async fn run_status(command: &str, limit: Duration) -> Result<StatusOutcome> {
    let mut child = shell(command)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_failure(command, e))?;
    let mut group = GroupGuard::new(&child);

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            group.disarm();
            Ok(StatusOutcome::Exited(
                status.map_err(|e| spawn_failure(command, e))?,
            ))
        }
        // the group guard drops first and takes every descendant along
        Err(_elapsed) => Ok(StatusOutcome::TimedOut),
    }
}
