//! Redis pub/sub plus list-backed backlogs.
//!
//! Note: Redis pub/sub is not durable (messages to offline subscribers are
//! dropped by the server). Durability here comes from the publisher-side
//! backlog protocol layered on the list operations below.

use std::fmt;
use std::sync::{Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use redis::Commands;
use tracing::{debug, error};

use relaybus::bus::{Bus, Delivery, Subscriber, Subscription, TransportError};
use relaybus_core::Topic;

/// How long the subscription pump blocks on the socket before applying
/// queued subscribe requests.
const READ_TICK: Duration = Duration::from_millis(100);

/// Redis-backed bus.
///
/// Publish and backlog operations share one command connection behind a
/// mutex; each opened subscription gets a dedicated connection owned by a
/// background pump thread. Connection failures surface as transport errors,
/// there is no automatic reconnect.
pub struct RedisBus {
    client: redis::Client,
    conn: Mutex<redis::Connection>,
}

impl RedisBus {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub fn connect(url: impl AsRef<str>) -> Result<Self, TransportError> {
        let client = redis::Client::open(url.as_ref())
            .map_err(|e| TransportError::new("connect", e))?;
        let conn = client
            .get_connection()
            .map_err(|e| TransportError::new("connect", e))?;

        Ok(Self {
            client,
            conn: Mutex::new(conn),
        })
    }

    fn command_conn(&self) -> Result<MutexGuard<'_, redis::Connection>, TransportError> {
        self.conn
            .lock()
            .map_err(|_| TransportError::new("lock", "redis command connection poisoned"))
    }
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

impl Bus for RedisBus {
    type Subscriber = RedisSubscriber;

    fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<u64, TransportError> {
        let mut conn = self.command_conn()?;
        let receivers: u64 = conn
            .publish(topic.as_str(), payload)
            .map_err(|e| TransportError::new("publish", e))?;
        Ok(receivers)
    }

    fn open_subscription(&self) -> Result<(Self::Subscriber, Subscription), TransportError> {
        let conn = self
            .client
            .get_connection()
            .map_err(|e| TransportError::new("subscribe", e))?;

        let (control_tx, control_rx) = mpsc::channel();
        let (delivery_tx, delivery_rx) = mpsc::channel();

        thread::Builder::new()
            .name("relaybus-redis-subscription".to_string())
            .spawn(move || subscription_pump(conn, control_rx, delivery_tx))
            .map_err(|e| TransportError::new("subscribe", e))?;

        Ok((
            RedisSubscriber {
                control: control_tx,
            },
            Subscription::new(delivery_rx),
        ))
    }

    fn backlog_len(&self, topic: &Topic) -> Result<u64, TransportError> {
        let mut conn = self.command_conn()?;
        conn.llen(topic.as_str())
            .map_err(|e| TransportError::new("llen", e))
    }

    fn backlog_push(&self, topic: &Topic, payload: &[u8]) -> Result<(), TransportError> {
        let mut conn = self.command_conn()?;
        let _: i64 = conn
            .lpush(topic.as_str(), payload)
            .map_err(|e| TransportError::new("lpush", e))?;
        Ok(())
    }

    fn backlog_pop(&self, topic: &Topic) -> Result<Option<Vec<u8>>, TransportError> {
        let mut conn = self.command_conn()?;
        conn.rpop(topic.as_str(), None)
            .map_err(|e| TransportError::new("rpop", e))
    }

    fn backlog_expire(&self, topic: &Topic, ttl: Duration) -> Result<bool, TransportError> {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut conn = self.command_conn()?;
        conn.pexpire(topic.as_str(), millis)
            .map_err(|e| TransportError::new("pexpire", e))
    }
}

/// Control handle for one Redis subscription.
///
/// Subscribe requests are handed to the pump thread and confirmed
/// synchronously; a call returns within roughly one read tick.
#[derive(Debug, Clone)]
pub struct RedisSubscriber {
    control: mpsc::Sender<SubscribeRequest>,
}

struct SubscribeRequest {
    topic: Topic,
    reply: mpsc::Sender<Result<(), TransportError>>,
}

impl Subscriber for RedisSubscriber {
    fn subscribe(&self, topic: &Topic) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .send(SubscribeRequest {
                topic: topic.clone(),
                reply: reply_tx,
            })
            .map_err(|_| TransportError::new("subscribe", "subscription connection closed"))?;

        reply_rx
            .recv()
            .map_err(|_| TransportError::new("subscribe", "subscription connection closed"))?
    }
}

/// Owns the dedicated subscription connection: applies queued subscribe
/// requests between reads and forwards every message into the stream.
/// Exits when the stream's consumer goes away or the connection fails,
/// which closes the stream.
fn subscription_pump(
    mut conn: redis::Connection,
    control: mpsc::Receiver<SubscribeRequest>,
    deliveries: mpsc::Sender<Delivery>,
) {
    let mut pubsub = conn.as_pubsub();
    if let Err(err) = pubsub.set_read_timeout(Some(READ_TICK)) {
        error!(error = %err, "redis subscription setup failed");
        return;
    }

    loop {
        while let Ok(request) = control.try_recv() {
            let result = pubsub
                .subscribe(request.topic.as_str())
                .map_err(|e| TransportError::new("subscribe", e));
            if result.is_ok() {
                debug!(topic = %request.topic, "subscribed");
            }
            let _ = request.reply.send(result);
        }

        match pubsub.get_message() {
            Ok(message) => {
                let delivery = Delivery::new(
                    Topic::from_qualified(message.get_channel_name()),
                    message.get_payload_bytes().to_vec(),
                );
                if deliveries.send(delivery).is_err() {
                    return;
                }
            }
            Err(err) if err.is_timeout() => continue,
            Err(err) => {
                error!(error = %err, "redis subscription lost");
                return;
            }
        }
    }
}
