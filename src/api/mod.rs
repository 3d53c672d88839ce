//! HTTP API for members, administrators and anonymous gallery viewers.
//!
//! `api_router()` returns a composable `Router`; `server` wraps it in a
//! background axum server with a shutdown handle.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server_on, ApiServer, ApiSession};
pub use types::ApiContext;
