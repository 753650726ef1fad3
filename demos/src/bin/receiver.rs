use std::sync::mpsc;

use anyhow::Context;

use relaybus::dispatcher::Dispatcher;
use relaybus_core::ServiceName;
use relaybus_demo::{Reading, SERVICE, TOPIC};
use relaybus_redis::RedisBus;

fn main() -> anyhow::Result<()> {
    relaybus_observability::init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
        tracing::warn!("REDIS_URL not set; using redis://127.0.0.1:6379");
        "redis://127.0.0.1:6379".to_string()
    });
    let bus = RedisBus::connect(&redis_url).context("connect to redis")?;

    let dispatcher =
        Dispatcher::new(&bus, ServiceName::new(SERVICE)?).context("open subscription")?;
    dispatcher.register_handler(TOPIC, |event| {
        let reading = Reading::from_bytes(event.data())?;
        tracing::info!(value = reading.value, "reading received");
        Ok(())
    })?;

    // Runs until the process is stopped.
    let (_shutdown, shutdown_rx) = mpsc::channel();
    dispatcher.run(shutdown_rx)?;
    Ok(())
}
