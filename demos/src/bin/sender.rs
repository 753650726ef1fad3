use std::thread;
use std::time::Duration;

use anyhow::Context;

use relaybus::publisher::{Publisher, PublisherConfig};
use relaybus_core::{Event, ServiceName};
use relaybus_demo::{Reading, SERVICE, TOPIC};
use relaybus_redis::RedisBus;

fn main() -> anyhow::Result<()> {
    relaybus_observability::init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
        tracing::warn!("REDIS_URL not set; using redis://127.0.0.1:6379");
        "redis://127.0.0.1:6379".to_string()
    });
    let bus = RedisBus::connect(&redis_url).context("connect to redis")?;

    // Up to five readings survive while the receiver is away.
    let publisher = Publisher::with_config(
        bus,
        ServiceName::new(SERVICE)?,
        PublisherConfig::default().with_buffer_size(5),
    );

    for value in 0..10 {
        let reading = Reading::new(value);
        let event = Event::new(reading.to_bytes()?);
        match publisher.send(TOPIC, &event) {
            Ok(()) => tracing::info!(value, "reading published"),
            Err(err) => tracing::warn!(value, error = %err, "reading not delivered"),
        }
        thread::sleep(Duration::from_secs(3));
    }

    Ok(())
}
