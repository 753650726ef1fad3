//! Handler registration and the dispatch loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use relaybus_core::{Event, ServiceName, Topic};

use crate::bus::{Bus, Delivery, Subscriber, Subscription, TransportError};

/// Error type handlers may return. It is logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler function type.
pub type Handler = Box<dyn Fn(Event) -> Result<(), HandlerError> + Send + Sync>;

/// How long the loop waits on the stream before re-checking for
/// cancellation.
const POLL_TICK: Duration = Duration::from_millis(100);

/// Failure of dispatcher registration or of the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Subscribing the topic on the backing bus failed; the handler was not
    /// recorded.
    #[error("subscribe {topic}: {source}")]
    Subscribe {
        topic: Topic,
        source: TransportError,
    },

    /// The delivery stream disconnected (backing connection lost).
    #[error("subscription stream closed")]
    StreamClosed,

    /// The loop observed a cancellation signal.
    #[error("dispatch loop cancelled")]
    Cancelled,
}

/// Routes incoming deliveries to per-topic handlers.
///
/// One dispatcher owns one live registration on the backing bus. Handlers
/// are recorded per logical topic (scoped to the dispatcher's service) and
/// invoked sequentially by [`Dispatcher::run`]; a failing handler affects
/// only the message that triggered it.
pub struct Dispatcher<B: Bus> {
    service: ServiceName,
    subscriber: B::Subscriber,
    stream: Mutex<Subscription>,
    handlers: RwLock<HashMap<Topic, Handler>>,
}

impl<B: Bus> Dispatcher<B> {
    /// Open the dispatcher's subscription on the bus.
    pub fn new(bus: &B, service: ServiceName) -> Result<Self, TransportError> {
        let (subscriber, stream) = bus.open_subscription()?;
        Ok(Self {
            service,
            subscriber,
            stream: Mutex::new(stream),
            handlers: RwLock::new(HashMap::new()),
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Subscribe to the service-scoped `topic` and record `handler` for it.
    ///
    /// On subscribe failure nothing is recorded. Registering the same topic
    /// again replaces the handler. Safe to call while the loop runs.
    pub fn register_handler<H>(&self, topic: &str, handler: H) -> Result<(), DispatchError>
    where
        H: Fn(Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let topic = Topic::scoped(&self.service, topic);

        self.subscriber
            .subscribe(&topic)
            .map_err(|source| DispatchError::Subscribe {
                topic: topic.clone(),
                source,
            })?;

        self.handlers
            .write()
            .unwrap()
            .insert(topic, Box::new(handler));
        Ok(())
    }

    /// Run the dispatch loop on the caller's thread.
    ///
    /// Per-message failures (unrouted topic, undecodable payload, handler
    /// error) are logged and skipped. The loop returns only on cancellation
    /// ([`DispatchError::Cancelled`], also raised when the shutdown sender
    /// is dropped) or when the delivery stream closes. One loop per
    /// dispatcher; a second concurrent call blocks until the first returns.
    pub fn run(&self, shutdown: mpsc::Receiver<()>) -> Result<(), DispatchError> {
        let stream = self.stream.lock().unwrap();
        info!(service = %self.service, "dispatch loop started");

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                    info!(service = %self.service, "dispatch loop stopped");
                    return Err(DispatchError::Cancelled);
                }
                Err(mpsc::TryRecvError::Empty) => {}
            }

            match stream.recv_timeout(POLL_TICK) {
                Ok(delivery) => {
                    if let Err(err) = self.dispatch(&delivery) {
                        warn!(topic = %delivery.topic, error = %err, "message dispatch failed");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!(service = %self.service, "subscription stream closed");
                    return Err(DispatchError::StreamClosed);
                }
            }
        }
    }

    /// Route one delivery: handler lookup, envelope decode, invocation.
    fn dispatch(&self, delivery: &Delivery) -> Result<(), DispatchFailure> {
        let handlers = self.handlers.read().unwrap();
        let handler = handlers
            .get(&delivery.topic)
            .ok_or(DispatchFailure::UnroutedTopic)?;

        let event: Event = serde_json::from_slice(&delivery.payload)?;
        handler(event).map_err(DispatchFailure::Handler)
    }
}

impl<B: Bus + 'static> Dispatcher<B> {
    /// Run the dispatch loop on a named background thread.
    ///
    /// Keep a clone of the `Arc` to register further handlers while the
    /// loop runs.
    pub fn spawn(self: Arc<Self>) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(format!("{}-dispatcher", self.service))
            .spawn(move || match self.run(shutdown_rx) {
                Ok(()) | Err(DispatchError::Cancelled) => {}
                Err(err) => error!(error = %err, "dispatch loop terminated"),
            })
            .expect("failed to spawn dispatcher thread");

        DispatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

/// Handle to control and join a running dispatch loop.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Per-message failure inside the loop. Logged with topic context only.
#[derive(Debug, Error)]
enum DispatchFailure {
    #[error("no handler registered")]
    UnroutedTopic,

    #[error("decode envelope: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(HandlerError),
}
