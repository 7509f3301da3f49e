//! Hint listener against a mock Socket.IO server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockSocketIoServer;
use qxmon_monitor::WakeHint;
use qxmon_notify::{HintListener, ListenerState, NotifierConfig, NotifyError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

fn config(url: String) -> NotifierConfig {
    NotifierConfig {
        url,
        max_reconnect_attempts: 3,
        reconnect_base_delay_ms: 20,
        reconnect_max_delay_ms: 100,
        reconnect_jitter_ms: 0,
        handshake_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn spawn(listener: &Arc<HintListener>) -> JoinHandle<Result<(), NotifyError>> {
    let listener = listener.clone();
    tokio::spawn(async move { listener.run().await })
}

#[tokio::test]
async fn test_subscribed_event_wakes_pollers() {
    let server = MockSocketIoServer::start(10_000).await;
    let hint = WakeHint::new();
    let mut rx = hint.subscribe();
    let listener = Arc::new(HintListener::new(config(server.url()), hint.clone()));
    let handle = spawn(&listener);

    server.wait_for_message("40", 1).await;
    server.push(r#"42["chat",{"text":"hello"}]"#);
    server.push(r#"42["trades_updated",{"asset":"CFB"}]"#);

    timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("no hint received")
        .unwrap();
    assert_eq!(hint.sequence(), 1);
    assert_eq!(listener.state(), ListenerState::Connected);

    listener.shutdown();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_engine_ping_gets_pong() {
    let server = MockSocketIoServer::start(10_000).await;
    let listener = Arc::new(HintListener::new(config(server.url()), WakeHint::new()));
    let handle = spawn(&listener);

    server.wait_for_message("40", 1).await;
    server.push("2");
    server.wait_for_message("3", 1).await;

    listener.shutdown();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = MockSocketIoServer::start(10_000).await;
    let hint = WakeHint::new();
    let listener = Arc::new(HintListener::new(config(server.url()), hint.clone()));
    let handle = spawn(&listener);

    server.wait_for_message("40", 1).await;
    assert_eq!(hint.sequence(), 0);

    server.drop_connections();
    server.wait_for_message("40", 2).await;
    assert_eq!(server.connection_count().await, 2);

    // The reconnect itself is a hint: events may have been missed.
    timeout(Duration::from_secs(2), async {
        while hint.sequence() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    listener.shutdown();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_heartbeat_triggers_reconnect() {
    // Advertised window is 2 x 100ms and the mock never pings.
    let server = MockSocketIoServer::start(100).await;
    let listener = Arc::new(HintListener::new(config(server.url()), WakeHint::new()));
    let handle = spawn(&listener);

    server.wait_for_message("40", 2).await;
    assert!(server.connection_count().await >= 2);

    listener.shutdown();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    // Grab a free port and release it so connections are refused.
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let listener = Arc::new(HintListener::new(
        config(format!("ws://{addr}/socket.io/?EIO=4&transport=websocket")),
        WakeHint::new(),
    ));
    let result = timeout(Duration::from_secs(5), listener.run()).await.unwrap();

    assert!(matches!(result, Err(NotifyError::ConnectionFailed(_))));
    assert_eq!(listener.reconnect_count(), 3);
    assert_eq!(listener.state(), ListenerState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_before_connect() {
    let listener = HintListener::new(config("ws://127.0.0.1:9".to_string()), WakeHint::new());
    listener.shutdown();
    assert!(listener.run().await.is_ok());
    assert!(listener.is_shutdown());
}
