//! Integration tests for plugin loading and hook dispatch through the host.

mod helpers;

use modhost_plugin::HookArgs;
use serde_json::json;

use helpers::{Behaviour, TestApp};

#[tokio::test]
async fn test_echo_plugin_answers_ping() {
    let app = TestApp::build(Behaviour::default(), &["EchoPlugin", "Recorder"]).await;

    let result = app.host.dispatch("Ping", &HookArgs::new()).await;
    assert_eq!(result.value, Some(json!("pong")));
    assert_eq!(result.answered(), 1);
    assert!(!result.has_conflicts());

    let pong: String = app.host.call_as("Ping", &HookArgs::new()).await;
    assert_eq!(pong, "pong");

    app.server.close().await;
}

#[tokio::test]
async fn test_unknown_module_is_rejected() {
    let app = TestApp::new().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Missing.plugin");
    std::fs::write(&path, b"").unwrap();

    assert!(app.host.load(&path).await.is_err());
    assert_eq!(app.host.load_failures(), 1);
    assert_eq!(app.host.list_plugins().await.len(), 1);

    app.server.close().await;
}

#[tokio::test]
async fn test_disabled_echo_stops_answering() {
    let app = TestApp::build(Behaviour::default(), &["EchoPlugin"]).await;

    assert!(app.host.disable("EchoPlugin").await);
    assert_eq!(app.host.call("Ping", &HookArgs::new()).await, None);

    assert!(app.host.enable("EchoPlugin").await);
    assert_eq!(app.host.call("Ping", &HookArgs::new()).await, Some(json!("pong")));

    app.server.close().await;
}

#[tokio::test]
async fn test_unload_all_before_server_close() {
    let app = TestApp::build(Behaviour::default(), &["EchoPlugin", "Recorder"]).await;

    app.host.unload_all().await;
    assert!(app.host.list_plugins().await.is_empty());

    app.server.close().await;
    assert_eq!(app.server.client_count(), 0);
}
