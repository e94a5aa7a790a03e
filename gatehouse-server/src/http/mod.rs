//! HTTP layer
//!
//! Axum router with:
//! - Unsigned health check
//! - Signed `/v1` API group
//! - Request tracing
//! - JSON envelope responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::{ok, ApiError, Envelope};
pub use server::{build_router, AppState};
