//! Event bus subsystem.
//!
//! # Data Flow
//! ```text
//! executor / webhook dispatcher / health monitor
//!     → bus.rs publish (never blocks)
//!     → one bounded queue per subscriber
//!     → subscribers.rs (audit log) and injected EventSubscriber impls
//! ```

pub mod bus;
pub mod subscribers;

pub use bus::{EventBus, EventStream, EventSubscriber};
pub use subscribers::LogSubscriber;
