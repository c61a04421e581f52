//! In-process event bus for the Lattice platform.
//!
//! Services communicate over named channels. A message published on a channel
//! is delivered to every live subscription of that channel; request/response
//! pairing is done with correlation ids, not with dedicated reply channels.
//!
//! The [`EventBus`] trait is the contract consumed by `lattice-server`; it is
//! a trait (rather than a concrete type) so embedders and tests can substitute
//! their own bus. [`MemoryBus`] is the in-process implementation used by the
//! server binary and the conformance suite.

pub mod bus;
pub mod memory;
pub mod message;
pub mod store;
pub mod subscription;

pub use bus::{BusError, EventBus};
pub use memory::MemoryBus;
pub use message::{Message, MessageDirection};
pub use store::{Store, StoreManager, SERVICE_READY_STORE};
pub use subscription::Subscription;

/// Channel names beginning with this prefix are reserved for platform
/// internals (readiness notifications and the like). Services must not
/// publish application traffic on them.
pub const INTERNAL_CHANNEL_PREFIX: &str = "#lattice-";
