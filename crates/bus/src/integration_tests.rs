//! Integration tests for the full messaging pipeline.
//!
//! Tests: Publisher → backing bus → Dispatcher → handler
//!
//! Verifies:
//! - Published events reach registered handlers byte-for-byte
//! - Zero-subscriber sends park events that replay on later sends
//! - Service scoping isolates topics end to end
//! - Cancellation stops processing promptly

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use relaybus_core::{Event, ServiceName, Topic};

    use crate::bus::Bus;
    use crate::dispatcher::Dispatcher;
    use crate::in_memory_bus::InMemoryBus;
    use crate::publisher::{Publisher, PublisherConfig};

    fn test_service() -> ServiceName {
        ServiceName::new("metering").unwrap()
    }

    fn setup(
        config: PublisherConfig,
    ) -> (
        Arc<InMemoryBus>,
        Publisher<Arc<InMemoryBus>>,
        Arc<Dispatcher<Arc<InMemoryBus>>>,
        Arc<Mutex<Vec<Vec<u8>>>>,
    ) {
        let bus = Arc::new(InMemoryBus::new());
        let publisher = Publisher::with_config(bus.clone(), test_service(), config);
        let dispatcher = Arc::new(Dispatcher::new(&bus, test_service()).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        (bus, publisher, dispatcher, seen)
    }

    /// Helper: wait a short time for the dispatch loop to process events.
    fn wait_for_processing() {
        std::thread::sleep(Duration::from_millis(150));
    }

    #[test]
    fn published_events_reach_the_registered_handler() {
        let (_bus, publisher, dispatcher, seen) = setup(PublisherConfig::default());

        let sink = seen.clone();
        dispatcher
            .register_handler("readings", move |event| {
                sink.lock().unwrap().push(event.into_data());
                Ok(())
            })
            .unwrap();
        let handle = dispatcher.clone().spawn();

        for byte in 1..=3u8 {
            publisher.send("readings", &Event::new(vec![byte])).unwrap();
        }

        wait_for_processing();
        handle.shutdown();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[vec![1u8], vec![2], vec![3]]
        );
    }

    #[test]
    fn backlogged_events_replay_when_a_subscriber_returns() {
        let (bus, publisher, dispatcher, seen) = setup(
            PublisherConfig::default()
                .with_buffer_size(2)
                .with_buffer_lifetime(Duration::from_secs(3600)),
        );
        let topic = Topic::scoped(&test_service(), "readings");

        // Nobody listening yet: capacity two retains the newest pair.
        for byte in [b'A', b'B', b'C'] {
            publisher.send("readings", &Event::new(vec![byte])).unwrap();
        }
        assert_eq!(bus.backlog_len(&topic).unwrap(), 2);

        let sink = seen.clone();
        dispatcher
            .register_handler("readings", move |event| {
                sink.lock().unwrap().push(event.into_data());
                Ok(())
            })
            .unwrap();
        let handle = dispatcher.clone().spawn();

        publisher.send("readings", &Event::new(vec![b'D'])).unwrap();

        wait_for_processing();
        handle.shutdown();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[vec![b'D'], vec![b'B'], vec![b'C']]
        );
        assert_eq!(bus.backlog_len(&topic).unwrap(), 0);
    }

    #[test]
    fn services_are_isolated_by_scope() {
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Arc::new(
            Dispatcher::new(&bus, ServiceName::new("alpha").unwrap()).unwrap(),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher
            .register_handler("readings", move |event| {
                sink.lock().unwrap().push(event.into_data());
                Ok(())
            })
            .unwrap();
        let handle = dispatcher.clone().spawn();

        // Same logical topic, different service scope: no live subscribers.
        let publisher = Publisher::new(bus, ServiceName::new("beta").unwrap());
        let err = publisher.send("readings", &Event::new(vec![1u8])).unwrap_err();
        assert!(matches!(
            err,
            crate::publisher::SendError::NoSubscribers { .. }
        ));

        wait_for_processing();
        handle.shutdown();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn shutdown_stops_processing() {
        let (_bus, publisher, dispatcher, seen) = setup(PublisherConfig::default());

        let sink = seen.clone();
        dispatcher
            .register_handler("readings", move |event| {
                sink.lock().unwrap().push(event.into_data());
                Ok(())
            })
            .unwrap();
        let handle = dispatcher.clone().spawn();

        publisher.send("readings", &Event::new(vec![1u8])).unwrap();
        wait_for_processing();
        handle.shutdown();

        // The subscription still counts as live at the store, but nothing
        // consumes it anymore.
        publisher.send("readings", &Event::new(vec![2u8])).unwrap();
        wait_for_processing();

        assert_eq!(seen.lock().unwrap().as_slice(), &[vec![1u8]]);
    }
}
