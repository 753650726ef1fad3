//! Backing-bus abstraction (mechanics only).
//!
//! The messaging layer runs on top of any store offering three capabilities:
//!
//! - **Fire-and-forget publish** that reports how many live subscribers
//!   received the bytes (`0` means nobody was listening).
//! - **Topic subscription** over one shared registration, delivering
//!   `(topic, payload)` pairs in arrival order.
//! - **Per-topic backlog lists** with head-insert, tail-removal, length and
//!   expiry refresh, matching the usual key-value list primitives.
//!
//! The contract is deliberately minimal: no delivery guarantee beyond
//! fire-and-forget, no ordering across topics, no storage assumption other
//! than the backlog keyspace. Everything resembling durability is built on
//! top by the publisher's bounded backlog protocol.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use thiserror::Error;

use relaybus_core::Topic;

/// Failure of a backing-store operation.
///
/// Adapters wrap their native errors into this type; the failing operation
/// name is kept for log context.
#[derive(Debug, Clone, Error)]
#[error("transport failure during {operation}: {detail}")]
pub struct TransportError {
    operation: &'static str,
    detail: String,
}

impl TransportError {
    pub fn new(operation: &'static str, detail: impl ToString) -> Self {
        Self {
            operation,
            detail: detail.to_string(),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// A message delivered on a subscription: the qualified topic it arrived on
/// plus the raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(topic: Topic, payload: Vec<u8>) -> Self {
        Self { topic, payload }
    }
}

/// Stream side of a subscription.
///
/// Deliveries for all topics registered through the paired [`Subscriber`]
/// handle arrive here in arrival order. Designed for single-threaded
/// consumption (the dispatch loop).
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<Delivery>,
}

impl Subscription {
    pub fn new(receiver: Receiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Block until the next delivery is available.
    pub fn recv(&self) -> Result<Delivery, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a delivery without blocking.
    pub fn try_recv(&self) -> Result<Delivery, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a delivery.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Delivery, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Control side of a subscription: adds topics to the live registration.
pub trait Subscriber: Send + Sync {
    /// Subscribe the paired stream to one more topic.
    ///
    /// Returns only after the backing store has confirmed the registration,
    /// so a successful call means subsequent publishes on `topic` count this
    /// subscriber as live.
    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError>;
}

/// Capability contract of the backing store.
///
/// ## Publish semantics
///
/// `publish` is fire-and-forget: bytes observed by nobody are gone as far
/// as the store is concerned. The returned live-subscriber count is the
/// only feedback channel; the publisher uses `0` to decide that an event
/// needs to be backlogged.
///
/// ## Backlog keyspace
///
/// The `backlog_*` operations address per-topic lists that exist
/// independently of pub/sub state. New entries go to the head and drains
/// take from the tail, so a backlog always holds newest-first. A list
/// popped to empty disappears; refreshing the expiry of a missing list
/// reports `false`.
///
/// ## Thread safety
///
/// Implementations are shared across publisher and dispatcher threads and
/// must serialize their own connection use.
pub trait Bus: Send + Sync {
    /// Control handle returned by [`Bus::open_subscription`].
    type Subscriber: Subscriber;

    /// Publish `payload` on `topic`, returning how many live subscribers
    /// received it.
    fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<u64, TransportError>;

    /// Open one live registration: a control handle for adding topics and
    /// the stream all matching deliveries arrive on.
    fn open_subscription(&self) -> Result<(Self::Subscriber, Subscription), TransportError>;

    /// Current length of the topic's backlog (0 when absent).
    fn backlog_len(&self, topic: &Topic) -> Result<u64, TransportError>;

    /// Insert `payload` at the head of the topic's backlog, creating the
    /// backlog if missing.
    fn backlog_push(&self, topic: &Topic, payload: &[u8]) -> Result<(), TransportError>;

    /// Remove and return the entry at the tail of the topic's backlog;
    /// `None` when the backlog is empty or missing.
    fn backlog_pop(&self, topic: &Topic) -> Result<Option<Vec<u8>>, TransportError>;

    /// Reset the backlog's time-to-live. Returns `false` when the store
    /// could not confirm the refresh (typically: no such backlog).
    fn backlog_expire(&self, topic: &Topic, ttl: Duration) -> Result<bool, TransportError>;
}

impl<B> Bus for Arc<B>
where
    B: Bus + ?Sized,
{
    type Subscriber = B::Subscriber;

    fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<u64, TransportError> {
        (**self).publish(topic, payload)
    }

    fn open_subscription(&self) -> Result<(Self::Subscriber, Subscription), TransportError> {
        (**self).open_subscription()
    }

    fn backlog_len(&self, topic: &Topic) -> Result<u64, TransportError> {
        (**self).backlog_len(topic)
    }

    fn backlog_push(&self, topic: &Topic, payload: &[u8]) -> Result<(), TransportError> {
        (**self).backlog_push(topic, payload)
    }

    fn backlog_pop(&self, topic: &Topic) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).backlog_pop(topic)
    }

    fn backlog_expire(&self, topic: &Topic, ttl: Duration) -> Result<bool, TransportError> {
        (**self).backlog_expire(topic, ttl)
    }
}
