//! HTTP API.
//!
//! Exposes scheduling, occupancy and billing as JSON endpoints. Routes
//! are nested under `/api/` and wrapped by a middleware stack:
//! CORS → Access log → Rate limit → Handler.
//!
//! The router is composable: `api_router()` returns a `Router` that can
//! be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerError};
pub use types::ApiContext;
