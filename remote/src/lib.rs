//! Remote host control core.
//!
//! Keeps a fixed registry of hosts, tracks their reachability with periodic
//! probes, and runs their configured actions on demand:
//! - [`HostRecord`]: one host, its validated actions and probed reachability
//! - [`Waiter`]: interruptible sleep between poll cycles
//! - [`Controller`]: registry owner; snapshots, `perform`, `update_once`, `poll_state`
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

mod controller;
mod encoding;
mod error;
mod exec;
mod host;
mod waiter;

pub use controller::{
    ActionOutput, Controller, ControllerSettings, DEFAULT_PROBE_COMMAND, DEFAULT_PROBE_TIMEOUT,
    ProbeSettings, StateStream,
};
pub use encoding::TextEncoding;
pub use error::{DecodeError, RemoteError, Result};
pub use exec::{ADDRESS_PLACEHOLDER, compose_command, probe_command};
pub use host::{ActionMap, ActionSpec, HostRecord, HostSnapshot, HostSpec, Reachability};
pub use waiter::Waiter;
