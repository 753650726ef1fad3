//! `relaybus-redis` — Redis-backed implementation of the bus contract.

pub mod pubsub;

pub use pubsub::{RedisBus, RedisSubscriber};
