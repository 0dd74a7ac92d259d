//! containerops allocation service.
//!
//! Exposes the IP and port allocators as synchronous request/response RPC
//! over HTTP for deployment tooling that cannot link the library directly.

pub mod api;
pub mod config;
pub mod state;
