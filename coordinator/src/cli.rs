//! Command-line interface definitions for the coordinator.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `hostctl` binary.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "hostctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the HTTP control service and the background reachability poller.
    ControlService(ServiceArgs),
}

/// Output format of the process-wide log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments for the control service command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hostctl.toml", env = "HOSTCTL_CONFIG")]
    pub config: String,
    /// Optional override for the listen port (overrides port in config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long)]
    pub bind: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}
