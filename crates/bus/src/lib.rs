//! `relaybus` — publish/subscribe with fallback buffering.
//!
//! Services exchange opaque event payloads on per-service topics without the
//! publisher knowing whether anyone is currently listening: a send that
//! reaches zero live subscribers parks the event in a bounded, expiring
//! backlog on the backing store, and later sends on the same topic replay
//! that backlog opportunistically.

pub mod bus;
pub mod dispatcher;
pub mod in_memory_bus;
pub mod publisher;

mod integration_tests;

pub use bus::{Bus, Delivery, Subscriber, Subscription, TransportError};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherHandle, Handler, HandlerError};
pub use in_memory_bus::{InMemoryBus, InMemorySubscriber};
pub use publisher::{
    BacklogError, DEFAULT_BUFFER_LIFETIME, Publisher, PublisherConfig, SendError,
};
