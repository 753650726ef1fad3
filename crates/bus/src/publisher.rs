//! Publishing with fallback buffering.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use relaybus_core::{Event, ServiceName, Topic};

use crate::bus::{Bus, TransportError};

/// Backlog lifetime applied when buffering is enabled without an explicit
/// lifetime.
pub const DEFAULT_BUFFER_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Publisher-side configuration.
#[derive(Debug, Clone, Default)]
pub struct PublisherConfig {
    /// Maximum number of backlogged events kept per topic; 0 disables
    /// buffering (the default).
    pub buffer_size: u64,
    /// Rolling time-to-live of a topic backlog, refreshed on every buffered
    /// write. Resolves to [`DEFAULT_BUFFER_LIFETIME`] when left unset.
    pub buffer_lifetime: Option<Duration>,
}

impl PublisherConfig {
    pub fn with_buffer_size(mut self, size: u64) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_buffer_lifetime(mut self, lifetime: Duration) -> Self {
        self.buffer_lifetime = Some(lifetime);
        self
    }

    /// Lifetime actually applied to backlog writes.
    pub fn effective_lifetime(&self) -> Duration {
        self.buffer_lifetime.unwrap_or(DEFAULT_BUFFER_LIFETIME)
    }
}

/// Failure while appending to or refreshing a topic backlog.
#[derive(Debug, Error)]
pub enum BacklogError {
    /// A backlog list operation failed at the store.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store did not confirm the expiry refresh after an append.
    #[error("backlog expiry refresh not confirmed for {topic}")]
    ExpiryNotConfirmed { topic: Topic },
}

/// Failure of [`Publisher::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The event envelope could not be serialized.
    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Publishing failed at the store; nothing was buffered.
    #[error("publish event: {0}")]
    Transport(#[from] TransportError),

    /// Nobody was subscribed and the event could not be backlogged.
    #[error("backlog event: {0}")]
    Backlog(#[from] BacklogError),

    /// Nobody was subscribed and buffering is disabled.
    #[error("no live subscribers on {topic}")]
    NoSubscribers { topic: Topic },
}

/// Topic-scoped publisher with fallback buffering.
///
/// Every send targets the qualified `service:topic` key. When the backing
/// bus reports zero live subscribers, the serialized envelope is parked in
/// a bounded per-topic backlog with a rolling expiry, and every later send
/// on that topic opportunistically replays the backlog through the normal
/// publish path.
///
/// Stateless per call; safe to share across threads.
pub struct Publisher<B: Bus> {
    bus: B,
    service: ServiceName,
    buffer_size: u64,
    buffer_lifetime: Duration,
}

impl<B: Bus> Publisher<B> {
    /// Publisher with buffering disabled.
    pub fn new(bus: B, service: ServiceName) -> Self {
        Self::with_config(bus, service, PublisherConfig::default())
    }

    /// Publisher with explicit buffering configuration.
    ///
    /// The backlog lifetime is resolved here: enabling buffering without a
    /// lifetime applies [`DEFAULT_BUFFER_LIFETIME`].
    pub fn with_config(bus: B, service: ServiceName, config: PublisherConfig) -> Self {
        let buffer_lifetime = config.effective_lifetime();
        Self {
            bus,
            service,
            buffer_size: config.buffer_size,
            buffer_lifetime,
        }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Publish `event` on the service-scoped `topic`.
    ///
    /// Zero live subscribers park the envelope in the topic backlog, or fail
    /// with [`SendError::NoSubscribers`] when buffering is disabled. The
    /// topic's existing backlog is drained afterwards on a best-effort
    /// basis; drain failures are logged and never affect the result.
    pub fn send(&self, topic: &str, event: &Event) -> Result<(), SendError> {
        let topic = Topic::scoped(&self.service, topic);
        let payload = serde_json::to_vec(event)?;

        let outcome = self.publish_or_buffer(&topic, &payload);
        // A failing transport gets no further traffic this call.
        if !matches!(outcome, Err(SendError::Transport(_))) {
            self.drain_backlog(&topic);
        }
        outcome
    }

    /// Publish once; park the payload in the backlog when nobody is
    /// listening.
    fn publish_or_buffer(&self, topic: &Topic, payload: &[u8]) -> Result<(), SendError> {
        let receivers = self.bus.publish(topic, payload)?;
        if receivers > 0 {
            return Ok(());
        }

        if self.buffer_size == 0 {
            return Err(SendError::NoSubscribers {
                topic: topic.clone(),
            });
        }

        self.buffer(topic, payload)?;
        debug!(topic = %topic, "event backlogged, no live subscribers");
        Ok(())
    }

    /// Append `payload` at the backlog head, evicting oldest entries so the
    /// post-append length never exceeds `buffer_size`, then refresh the
    /// backlog expiry.
    fn buffer(&self, topic: &Topic, payload: &[u8]) -> Result<(), BacklogError> {
        let len = self.bus.backlog_len(topic)?;
        if len >= self.buffer_size {
            let excess = (len - self.buffer_size) + 1;
            for _ in 0..excess {
                self.bus.backlog_pop(topic)?;
            }
        }

        self.bus.backlog_push(topic, payload)?;

        if !self.bus.backlog_expire(topic, self.buffer_lifetime)? {
            return Err(BacklogError::ExpiryNotConfirmed {
                topic: topic.clone(),
            });
        }
        Ok(())
    }

    /// Resend backlogged payloads through the normal publish path.
    ///
    /// The backlog length is snapshotted first and bounds the pass, so a
    /// payload re-parked by a zero-subscriber resend cannot cycle forever.
    /// Stops at the first empty pop or resend failure.
    fn drain_backlog(&self, topic: &Topic) {
        if self.buffer_size == 0 {
            return;
        }

        let pending = match self.bus.backlog_len(topic) {
            Ok(len) => len,
            Err(err) => {
                warn!(topic = %topic, error = %err, "backlog drain failed");
                return;
            }
        };

        for _ in 0..pending {
            let value = match self.bus.backlog_pop(topic) {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(err) => {
                    warn!(topic = %topic, error = %err, "backlog drain failed");
                    break;
                }
            };
            if value.is_empty() {
                break;
            }

            if let Err(err) = self.publish_or_buffer(topic, &value) {
                warn!(topic = %topic, error = %err, "backlog drain failed");
                break;
            }
            debug!(topic = %topic, "backlogged event resent");
        }
    }
}
