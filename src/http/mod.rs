//! HTTP ingress subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, limits)
//!     → webhooks.rs (POST /webhooks/{integration_id})
//!     → request.rs (raw headers → gateway Headers)
//!     → Gateway::handle_webhook
//!     → response.rs (ErrorCode → HTTP status)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod webhooks;

pub use request::X_REQUEST_ID;
pub use response::{status_for, ApiError};
pub use server::{build_router, AppState, HttpServer};
