//! HTTP API: upload endpoint, health check, CORS and body-limit layers.

pub mod error;
pub mod health;
pub mod router;
pub mod state;
pub mod upload;

pub use router::api_router;
pub use state::AppState;
