//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic sweep (active.rs):
//!     Timer tick
//!     → ProviderAdapter::health_check on each live integration
//!     → registry.record_health
//!
//! State machine (state.rs):
//!     active ←→ error
//!     With a failure threshold to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Probes run concurrently, each with its own deadline
//! - Health state is per integration
//! - Health events go through the same bus as call outcomes

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthTracker, StatusTransition};
