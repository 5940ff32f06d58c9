//! Integration gateway library.
//!
//! Mediates calls between the application and third-party providers
//! (marketplaces, payment processors, shipping carriers, accounting
//! systems) with bounded retries, circuit breaking, provider quotas and
//! safe webhook ingestion.

// Core model
pub mod error;
pub mod integration;

// Outbound path
pub mod executor;
pub mod provider;
pub mod registry;
pub mod resilience;

// Inbound path
pub mod webhooks;

// Fan-out and health
pub mod events;
pub mod health;

// Facade and ingress
pub mod admin;
pub mod gateway;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{ErrorCode, GatewayResult, IntegrationError};
pub use gateway::{Gateway, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
