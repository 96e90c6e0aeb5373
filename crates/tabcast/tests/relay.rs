//! End-to-end relay between channels over the bundled transports.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use tabcast::{
    Channel, ChannelOptions, Listener, MESSAGE_EVENT, Message, MethodChooser, TransportMethod,
};
use tabcast_transport::StorageMethod;
use tokio::sync::mpsc;

fn unique_name() -> String {
    format!("relay-{}", uuid::Uuid::new_v4())
}

fn fast() -> ChannelOptions {
    ChannelOptions::default()
        .with_throttle(Duration::from_millis(50))
        .with_loop_interval(Duration::from_millis(20))
}

fn collector() -> (Listener, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = Listener::new(move |msg| {
        let _ = tx.send(msg.clone());
    });
    (listener, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn native_relay_coalesces_bursts() {
    let name = unique_name();
    let sender = Channel::new(name.clone(), fast());
    let receiver = Channel::new(name, fast());
    assert_eq!(sender.transport_kind(), "native");
    assert!(!receiver.is_inert());

    let (listener, mut rx) = collector();
    receiver.on_message(listener);

    for v in 1..=5 {
        sender.post_message(Message::new("cursor").with("v", v));
    }
    sender.post_message(Message::new("selection").with("range", json!([1, 4])));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let got = drain(&mut rx);
    assert_eq!(got.len(), 2, "{got:?}");
    let cursor = got.iter().find(|m| m.kind == "cursor").unwrap();
    assert_eq!(cursor.get("v"), Some(&json!(5)));
    assert!(got.iter().any(|m| m.kind == "selection"));
}

#[tokio::test(start_paused = true)]
async fn native_relay_respects_names() {
    let a = Channel::new(unique_name(), fast());
    let b = Channel::new(unique_name(), fast());
    let (listener, mut rx) = collector();
    b.on_message(listener);

    a.post_message(Message::new("ping"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn typed_listeners_filter_and_detach() {
    let name = unique_name();
    let sender = Channel::new(name.clone(), fast());
    let receiver = Channel::new(name, fast());

    let (cursor_only, mut cursor_rx) = collector();
    let (everything, mut all_rx) = collector();
    receiver.add_event_listener("cursor", cursor_only.clone());
    receiver.add_event_listener(MESSAGE_EVENT, everything);

    sender.post_message(Message::new("cursor"));
    sender.post_message(Message::new("scroll"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(drain(&mut cursor_rx).len(), 1);
    assert_eq!(drain(&mut all_rx).len(), 2);

    receiver.remove_event_listener("cursor", &cursor_only);
    sender.post_message(Message::new("cursor"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(drain(&mut cursor_rx).is_empty());
    assert_eq!(drain(&mut all_rx).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_receiver_hears_nothing() {
    let name = unique_name();
    let sender = Channel::new(name.clone(), fast());
    let receiver = Channel::new(name, fast());
    let (listener, mut rx) = collector();
    receiver.on_message(listener);

    receiver.close();
    assert!(receiver.is_closed());
    sender.post_message(Message::new("late"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn storage_relay_polls_at_loop_interval() {
    let storage_only = || {
        MethodChooser::new(vec![Arc::new(StorageMethod) as Arc<dyn TransportMethod>])
    };
    let name = unique_name();
    let sender = Channel::builder(name.clone())
        .options(fast())
        .selector(storage_only())
        .build();
    let receiver = Channel::builder(name)
        .options(fast())
        .selector(storage_only())
        .build();
    assert_eq!(sender.transport_kind(), "storage");

    let (listener, mut rx) = collector();
    receiver.on_message(listener);

    sender.post_message(Message::new("doc").with("rev", 1));
    sender.post_message(Message::new("doc").with("rev", 2));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let got = drain(&mut rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("rev"), Some(&json!(2)));
}

#[tokio::test]
async fn empty_name_is_inert_inside_runtime() {
    let channel = Channel::new("", ChannelOptions::default());
    assert!(channel.is_inert());
    assert_eq!(channel.transport_kind(), "noop");
    channel.post_message(Message::new("a"));
    channel.on_message(Listener::new(|_| {}));
    channel.close();
}
