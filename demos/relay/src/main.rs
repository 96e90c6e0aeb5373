//! Two channels on the same name relaying a burst of cursor updates.
//!
//! Run with: cargo run -p relay-demo
//!
//! Options can be overridden with a JSON object, e.g.
//! `TABCAST_OPTIONS='{"throttle": 50}' cargo run -p relay-demo`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use serde_json::json;
use tabcast::{Channel, ChannelOptions, Listener, Message};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHANNEL: &str = "relay-demo";
const UPDATES: usize = 200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tabcast=debug".into()),
        )
        .init();

    let options = match std::env::var("TABCAST_OPTIONS") {
        Ok(raw) => ChannelOptions::from_json_str(&raw).context("invalid TABCAST_OPTIONS")?,
        Err(_) => ChannelOptions::default(),
    };
    tracing::info!(?options, "starting relay demo");

    let sender = Channel::new(CHANNEL, options.clone());
    let receiver = Channel::new(CHANNEL, options);
    anyhow::ensure!(!sender.is_inert(), "no transport available");

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    receiver.on_message(Listener::new(move |msg| {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::info!(kind = %msg.kind, payload = %json!(msg.payload), "received");
    }));

    for i in 0..UPDATES {
        sender.post_message(Message::new("cursor").with("x", i).with("y", i * 2));
        if i % 50 == 0 {
            sender.post_message(Message::new("status").with("progress", i));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Let the last window flush.
    tokio::time::sleep(sender.options().throttle() + Duration::from_millis(100)).await;

    tracing::info!(
        posted = UPDATES,
        delivered = received.load(Ordering::Relaxed),
        "relay finished"
    );

    sender.close();
    receiver.close();
    Ok(())
}
