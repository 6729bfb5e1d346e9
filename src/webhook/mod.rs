//! Channel-facing webhook endpoint.

pub mod payload;
pub mod routes;

pub use routes::webhook_routes;
