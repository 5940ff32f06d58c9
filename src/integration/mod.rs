//! Integration data model.
//!
//! - `types.rs`: integration records, request/response envelopes, webhook and
//!   lifecycle events
//! - `credentials.rs`: redacted secret handling

pub mod credentials;
pub mod types;

pub use credentials::{Credentials, ExposeSecret, SecretString};
pub use types::{
    endpoint_path, get_header, Headers, Integration, IntegrationEvent, IntegrationEventType, IntegrationMetadata,
    IntegrationRequest, IntegrationResponse, IntegrationStatus, IntegrationType, ProviderSettings,
    RateLimitInfo, RateLimitSource, WebhookEvent, WebhookSettings,
};
