//! HTTP API module.
//!
//! This module provides the HTTP server, its request/response types and the
//! progress broadcaster used for Server-Sent Events.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{build_router, start_server};
pub use types::*;
