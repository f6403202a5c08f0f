//! End-to-end tests against a real WebSocket server on localhost

mod common;

use arenalink_client::{ArenaClient, ClientConfig, ConnectionState, Delivery};
use arenalink_core::Topic;
use common::MockWsServer;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn hall_server_handler(message: &serde_json::Value) -> Vec<serde_json::Value> {
    match message["cmd"].as_str() {
        Some("init") => vec![json!({"cmd": "init", "data": {}})],
        Some("queryHallData") => vec![json!({"cmd": "HallData", "data": [{"id": "T1"}]})],
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_hall_data_over_websocket() {
    let mut server = MockWsServer::with_handler(hall_server_handler).await;
    let client = ArenaClient::builder(ClientConfig::new(server.host()).with_device_id("screen-7"))
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe([Topic::HallData], tx).await;
    client.connect().unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        delivery,
        Delivery {
            topic: Topic::HallData,
            data: json!([{"id": "T1"}]),
        }
    );

    assert_eq!(
        server.wait_for_message().await.unwrap(),
        json!({"cmd": "init", "ID": "screen-7", "TYPE": "1"})
    );
    assert_eq!(
        server.wait_for_message().await.unwrap(),
        json!({"cmd": "queryHallData"})
    );

    // Nothing else was queried
    client.send_json(&json!({"cmd": "marker"})).unwrap();
    assert_eq!(
        server.wait_for_message().await.unwrap(),
        json!({"cmd": "marker"})
    );
    assert!(rx.try_recv().is_err());

    client.shutdown().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_background_closes_real_socket() {
    let mut server = MockWsServer::new().await;
    let client = ArenaClient::builder(ClientConfig::new(server.host()))
        .build()
        .unwrap();

    client.connect().unwrap();
    client
        .connection()
        .wait_for_state(ConnectionState::is_verified)
        .await
        .unwrap();
    assert_eq!(server.wait_for_message().await.unwrap()["cmd"], "init");

    client.enter_background().unwrap();
    client
        .connection()
        .wait_for_state(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    client.enter_foreground().unwrap();
    client
        .connection()
        .wait_for_state(ConnectionState::is_verified)
        .await
        .unwrap();
    assert_eq!(server.wait_for_message().await.unwrap()["cmd"], "init");

    client.shutdown().unwrap();
    server.shutdown().await;
}
