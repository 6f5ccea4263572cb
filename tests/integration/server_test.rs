//! Integration tests for the TCP server and its hook routing.

mod helpers;

use std::time::Duration;

use helpers::{Behaviour, Seen, TestApp};

#[tokio::test]
async fn test_connect_message_disconnect() {
    let app = TestApp::new().await;
    let mut stream = app.connect().await;

    let id = match app.next_seen().await {
        Seen::Client(id) => id,
        other => panic!("Expected OnNewClient first, got {other:?}"),
    };
    app.wait_for_clients(1).await;

    helpers::send(&mut stream, b"abc").await;
    assert_eq!(app.next_seen().await, Seen::Message(id, b"abc".to_vec()));

    drop(stream);
    app.wait_for_clients(0).await;
    assert!(app.drain_seen(Duration::from_millis(100)).await.is_empty());

    app.server.close().await;
}

#[tokio::test]
async fn test_close_disconnects_every_client() {
    let app = TestApp::new().await;

    let mut streams = Vec::new();
    for _ in 0..5 {
        streams.push(app.connect().await);
        assert!(matches!(app.next_seen().await, Seen::Client(_)));
    }
    app.wait_for_clients(5).await;
    assert_eq!(app.server.clients().len(), 5);

    app.server.close().await;
    assert_eq!(app.server.client_count(), 0);
    assert!(!app.server.is_listening());

    for stream in &mut streams {
        assert!(helpers::reads_eof(stream).await);
    }
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let app = TestApp::new().await;
    let addr = app.server.local_addr();

    tokio::time::timeout(Duration::from_secs(2), app.server.close())
        .await
        .expect("close with no clients should return promptly");
    app.server.close().await;

    assert!(!app.server.is_listening());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_plugin_replies_through_client() {
    let app = TestApp::build(Behaviour::default(), &["EchoPlugin", "Recorder"]).await;
    let mut stream = app.connect().await;
    assert!(matches!(app.next_seen().await, Seen::Client(_)));

    helpers::send(&mut stream, b"hello").await;
    assert_eq!(helpers::read_exact(&mut stream, 5).await, b"hello");

    app.server.close().await;
}

#[tokio::test]
async fn test_client_closed_on_connect_gets_no_messages() {
    let app = TestApp::with_behaviour(Behaviour {
        close_on_connect: true,
        ..Behaviour::default()
    })
    .await;

    let mut stream = app.connect().await;
    assert!(matches!(app.next_seen().await, Seen::Client(_)));

    let _ = tokio::io::AsyncWriteExt::write_all(&mut stream, b"ignored").await;
    assert!(helpers::reads_eof(&mut stream).await);
    assert!(app.drain_seen(Duration::from_millis(200)).await.is_empty());
    app.wait_for_clients(0).await;

    app.server.close().await;
}

#[tokio::test]
async fn test_slow_hook_does_not_block_other_clients() {
    let app = TestApp::with_behaviour(Behaviour {
        stall: Some(Duration::from_millis(1000)),
        ..Behaviour::default()
    })
    .await;

    let mut slow = app.connect().await;
    let slow_id = match app.next_seen().await {
        Seen::Client(id) => id,
        other => panic!("Expected OnNewClient, got {other:?}"),
    };
    helpers::send(&mut slow, b"slow").await;

    let mut fast = app.connect().await;
    let fast_id = match app.next_seen().await {
        Seen::Client(id) => id,
        other => panic!("Expected OnNewClient, got {other:?}"),
    };
    helpers::send(&mut fast, b"fast").await;

    assert_eq!(app.next_seen().await, Seen::Message(fast_id, b"fast".to_vec()));
    assert_eq!(app.next_seen().await, Seen::Message(slow_id, b"slow".to_vec()));

    app.server.close().await;
}

#[tokio::test]
async fn test_messages_keep_order_per_client() {
    let app = TestApp::new().await;
    let mut stream = app.connect().await;
    let id = match app.next_seen().await {
        Seen::Client(id) => id,
        other => panic!("Expected OnNewClient, got {other:?}"),
    };

    let mut received = Vec::new();
    for chunk in [&b"one,"[..], b"two,", b"three"] {
        helpers::send(&mut stream, chunk).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    while received.len() < b"one,two,three".len() {
        match app.next_seen().await {
            Seen::Message(from, data) => {
                assert_eq!(from, id);
                received.extend(data);
            }
            other => panic!("Unexpected hook {other:?}"),
        }
    }
    assert_eq!(received, b"one,two,three");

    app.server.close().await;
}
