//! In-memory backing bus for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::time::{Duration, Instant};

use relaybus_core::Topic;

use crate::bus::{Bus, Delivery, Subscriber, Subscription, TransportError};

/// In-memory backing bus.
///
/// - No IO / no async
/// - Key lifecycle mirrors the usual list-store behavior: a backlog popped
///   to empty disappears, refreshing the expiry of a missing backlog
///   reports `false`, and expired backlogs vanish on next access.
/// - Duplicate subscriptions of one handle to one topic are idempotent.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_subscriber_id: u64,
    subscribers: HashMap<Topic, Vec<(u64, mpsc::Sender<Delivery>)>>,
    backlogs: HashMap<Topic, Backlog>,
}

#[derive(Debug)]
struct Backlog {
    entries: VecDeque<Vec<u8>>,
    expires_at: Option<Instant>,
}

impl Inner {
    fn purge_expired(&mut self, topic: &Topic) {
        let expired = self
            .backlogs
            .get(topic)
            .is_some_and(|b| b.expires_at.is_some_and(|at| at <= Instant::now()));
        if expired {
            self.backlogs.remove(topic);
        }
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, Inner>, TransportError> {
        self.inner
            .lock()
            .map_err(|_| TransportError::new("lock", "in-memory bus state poisoned"))
    }

    /// Remaining time-to-live of the topic's backlog, when one exists and
    /// carries an expiry. Intended for test assertions.
    pub fn backlog_ttl(&self, topic: &Topic) -> Option<Duration> {
        let mut inner = self.inner.lock().ok()?;
        inner.purge_expired(topic);
        let expires_at = inner.backlogs.get(topic)?.expires_at?;
        expires_at.checked_duration_since(Instant::now())
    }
}

impl Bus for InMemoryBus {
    type Subscriber = InMemorySubscriber;

    fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<u64, TransportError> {
        let mut inner = self.locked()?;
        let Some(senders) = inner.subscribers.get_mut(topic) else {
            return Ok(0);
        };

        // Drop dead subscribers while publishing.
        senders.retain(|(_, tx)| {
            tx.send(Delivery::new(topic.clone(), payload.to_vec()))
                .is_ok()
        });

        Ok(senders.len() as u64)
    }

    fn open_subscription(&self) -> Result<(Self::Subscriber, Subscription), TransportError> {
        let mut inner = self.locked()?;
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        let (tx, rx) = mpsc::channel();
        let subscriber = InMemorySubscriber {
            inner: self.inner.clone(),
            id,
            tx,
        };
        Ok((subscriber, Subscription::new(rx)))
    }

    fn backlog_len(&self, topic: &Topic) -> Result<u64, TransportError> {
        let mut inner = self.locked()?;
        inner.purge_expired(topic);
        Ok(inner
            .backlogs
            .get(topic)
            .map_or(0, |b| b.entries.len() as u64))
    }

    fn backlog_push(&self, topic: &Topic, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.locked()?;
        inner.purge_expired(topic);
        inner
            .backlogs
            .entry(topic.clone())
            .or_insert_with(|| Backlog {
                entries: VecDeque::new(),
                expires_at: None,
            })
            .entries
            .push_front(payload.to_vec());
        Ok(())
    }

    fn backlog_pop(&self, topic: &Topic) -> Result<Option<Vec<u8>>, TransportError> {
        let mut inner = self.locked()?;
        inner.purge_expired(topic);
        let Some(backlog) = inner.backlogs.get_mut(topic) else {
            return Ok(None);
        };

        let value = backlog.entries.pop_back();
        if backlog.entries.is_empty() {
            inner.backlogs.remove(topic);
        }
        Ok(value)
    }

    fn backlog_expire(&self, topic: &Topic, ttl: Duration) -> Result<bool, TransportError> {
        let mut inner = self.locked()?;
        inner.purge_expired(topic);
        match inner.backlogs.get_mut(topic) {
            Some(backlog) => {
                // A deadline too far out to represent never expires.
                backlog.expires_at = Instant::now().checked_add(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Control handle for one in-memory subscription.
#[derive(Debug, Clone)]
pub struct InMemorySubscriber {
    inner: Arc<Mutex<Inner>>,
    id: u64,
    tx: mpsc::Sender<Delivery>,
}

impl Subscriber for InMemorySubscriber {
    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TransportError::new("subscribe", "in-memory bus state poisoned"))?;

        let senders = inner.subscribers.entry(topic.clone()).or_default();
        if !senders.iter().any(|(id, _)| *id == self.id) {
            senders.push((self.id, self.tx.clone()));
        }
        Ok(())
    }
}
