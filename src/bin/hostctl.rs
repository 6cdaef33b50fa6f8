//! Shim binary that calls into the `hostctl_coordinator` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;
use hostctl_coordinator::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    hostctl_coordinator::inner_main(Cli::parse()).await
}
