//! HTTP server implementation for the coordinator control interface.
//!
//! Defines the remote-control routes and the server middleware stack.

pub mod api;
pub mod server;
