//! Webhook ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! ingress (http/webhooks.rs) raw headers + body
//!     → dispatcher.rs (resolve, validate, parse, dedup, handle)
//!     → signature.rs (HMAC validator used by the generic provider)
//!     → dedup.rs (recent event ids)
//!     → event bus
//! ```

pub mod dedup;
pub mod dispatcher;
pub mod handlers;
pub mod signature;

pub use dedup::{DedupCache, InMemoryDedupCache};
pub use dispatcher::{WebhookDispatcher, WebhookReceipt, WebhookStatus};
pub use handlers::AcknowledgingHandler;
pub use signature::{compute_signature, verify_signature, HmacSignatureValidator};
