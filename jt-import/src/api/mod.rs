//! HTTP API handlers for jt-import

pub mod auth;
pub mod health;
pub mod import;
pub mod sse;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use import::run_import;
pub use sse::event_stream;
