//! HTTP route handlers for the viewer server.

pub mod runs;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
