//! HTTP server plumbing for the coordinator control interface.
//!
//! This file contains the shared declarations for the split `server`
//! submodules (`router`, `middleware`).

pub mod middleware;
pub mod router;
