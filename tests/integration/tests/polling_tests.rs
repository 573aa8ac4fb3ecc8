//! Long-poll transport integration tests
//!
//! Run with: cargo test -p integration-tests --test polling_tests

use std::time::Duration;

use integration_tests::*;
use notify_common::TransportKind;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn start() -> TestServer {
    TestServer::start_with(|config| config.transport.poll_wait_ms = 200)
        .await
        .unwrap()
}

async fn open(server: &TestServer, token: &str) -> PollHandshakeResponse {
    let response = server.post_auth("/poll", token).await.unwrap();
    assert_json(response, StatusCode::OK).await.unwrap()
}

async fn poll(server: &TestServer, connection_id: &str, token: &str) -> Vec<Value> {
    let response = server
        .get_auth(&format!("/poll/{connection_id}"), token)
        .await
        .unwrap();
    assert_json(response, StatusCode::OK).await.unwrap()
}

#[tokio::test]
async fn test_handshake_then_ready() {
    let server = start().await;
    let user = unique("u");
    let token = token_for(&user, Some("t1"));

    let handshake = open(&server, &token).await;
    assert_eq!(handshake.poll_wait, 200);
    assert_eq!(handshake.heartbeat_interval, 25_000);

    let frames = poll(&server, &handshake.connection_id, &token).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], 0);
    assert_eq!(frames[0]["t"], "ready");
    assert_eq!(frames[0]["d"]["connectionId"], handshake.connection_id.as_str());
    assert_eq!(frames[0]["d"]["rooms"], json!([format!("user:{user}"), "team:t1"]));
}

#[tokio::test]
async fn test_token_in_query_parameter() {
    let server = start().await;
    let token = token_for(&unique("u"), None);

    let response = server
        .client
        .post(format!("{}/poll?token={token}", server.base_url()))
        .send()
        .await
        .unwrap();
    let handshake: PollHandshakeResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(!handshake.connection_id.is_empty());
}

#[tokio::test]
async fn test_handshake_requires_valid_token() {
    let server = start().await;

    let response = server
        .client
        .post(format!("{}/poll", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(
        assert_error(response, StatusCode::UNAUTHORIZED).await.unwrap(),
        "MISSING_AUTH"
    );

    let response = server.post_auth("/poll", &expired_token("u1")).await.unwrap();
    assert_eq!(
        assert_error(response, StatusCode::UNAUTHORIZED).await.unwrap(),
        "TOKEN_EXPIRED"
    );
    assert_eq!(server.state.connections().count(), 0);
    assert_eq!(server.state.slots().in_use(), 0);
}

#[tokio::test]
async fn test_poll_returns_queued_events() {
    let server = start().await;
    let user = unique("u");
    let token = token_for(&user, None);
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    for n in 0..2 {
        let response = server
            .post(
                &format!("{API}/deliveries/user"),
                &SendToUser {
                    user_id: &user,
                    event_type: "notify",
                    payload: json!({"n": n}),
                },
            )
            .await
            .unwrap();
        let result: UserDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
        assert!(result.delivered);
    }

    let frames = poll(&server, &handshake.connection_id, &token).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["d"]["n"], 0);
    assert_eq!(frames[1]["d"]["n"], 1);
    assert_eq!(frames[1]["s"], 3);
}

#[tokio::test]
async fn test_waiting_poll_wakes_on_delivery() {
    let server = TestServer::start_with(|config| config.transport.poll_wait_ms = 5_000)
        .await
        .unwrap();
    let user = unique("u");
    let token = token_for(&user, None);
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    let url = format!("{}/poll/{}", server.base_url(), handshake.connection_id);
    let waiting = tokio::spawn({
        let client = server.client.clone();
        let token = token.clone();
        async move {
            client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .unwrap()
                .json::<Vec<Value>>()
                .await
                .unwrap()
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    server
        .state
        .delivery()
        .send_to_user(&user, "wake", &json!({}))
        .unwrap();

    let frames = tokio::time::timeout(Duration::from_secs(2), waiting)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["t"], "wake");
}

#[tokio::test]
async fn test_empty_poll_after_wait() {
    let server = start().await;
    let token = token_for(&unique("u"), None);
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    let frames = poll(&server, &handshake.connection_id, &token).await;
    assert!(frames.is_empty());
}

#[tokio::test]
async fn test_concurrent_poll_conflicts() {
    let server = TestServer::start_with(|config| config.transport.poll_wait_ms = 1_000)
        .await
        .unwrap();
    let token = token_for(&unique("u"), None);
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    let path = format!("/poll/{}", handshake.connection_id);
    let first = server.get_auth(&path, &token);
    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        server.get_auth(&path, &token).await
    };
    let (first, second) = tokio::join!(first, second);

    assert_status(first.unwrap(), StatusCode::OK).await.unwrap();
    assert_eq!(
        assert_error(second.unwrap(), StatusCode::CONFLICT).await.unwrap(),
        "POLL_IN_PROGRESS"
    );
}

#[tokio::test]
async fn test_poll_by_another_user_is_forbidden() {
    let server = start().await;
    let token = token_for(&unique("owner"), None);
    let handshake = open(&server, &token).await;

    let response = server
        .get_auth(
            &format!("/poll/{}", handshake.connection_id),
            &token_for(&unique("intruder"), None),
        )
        .await
        .unwrap();
    assert_eq!(
        assert_error(response, StatusCode::FORBIDDEN).await.unwrap(),
        "CONNECTION_FORBIDDEN"
    );
}

#[tokio::test]
async fn test_unknown_connection_is_gone() {
    let server = start().await;
    let response = server
        .get_auth("/poll/does-not-exist", &token_for("u1", None))
        .await
        .unwrap();
    assert_eq!(
        assert_error(response, StatusCode::GONE).await.unwrap(),
        "CONNECTION_GONE"
    );
}

#[tokio::test]
async fn test_delete_closes_connection() {
    let server = start().await;
    let user = unique("u");
    let token = token_for(&user, Some("t1"));
    let handshake = open(&server, &token).await;
    let path = format!("/poll/{}", handshake.connection_id);

    let response = server.delete_auth(&path, &token).await.unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    assert!(!server.state.connections().is_user_connected(&user));
    assert_eq!(server.state.rooms().member_count("team:t1"), 0);
    assert_eq!(server.state.slots().in_use(), 0);

    let response = server.get_auth(&path, &token).await.unwrap();
    assert_status(response, StatusCode::GONE).await.unwrap();
}

#[tokio::test]
async fn test_forced_disconnect_ends_waiting_poll() {
    let server = TestServer::start_with(|config| config.transport.poll_wait_ms = 5_000)
        .await
        .unwrap();
    let user = unique("u");
    let token = token_for(&user, None);
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    let path = format!("/poll/{}", handshake.connection_id);
    let waiting = server.get_auth(&path, &token);
    let disconnect = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        server
            .post(&format!("{API}/users/{user}/disconnect"), &json!({"reason": "policy"}))
            .await
    };
    let (waiting, disconnect) = tokio::join!(waiting, disconnect);

    let result: DisconnectResponse = assert_json(disconnect.unwrap(), StatusCode::OK)
        .await
        .unwrap();
    assert_eq!(result.disconnected_count, 1);

    let body: Value = assert_json(waiting.unwrap(), StatusCode::GONE).await.unwrap();
    assert_eq!(body["error"]["message"], "Connection closed: policy");
}

#[tokio::test]
async fn test_idle_poll_connection_times_out() {
    let server = TestServer::start_with(|config| {
        config.transport.heartbeat_interval_ms = 20;
        config.transport.heartbeat_timeout_ms = 60;
    })
    .await
    .unwrap();
    let user = unique("u");
    let token = token_for(&user, None);
    let handshake = open(&server, &token).await;

    assert!(eventually(|| !server.state.connections().is_user_connected(&user)).await);
    assert!(eventually(|| server.state.poll_sessions().is_empty()).await);

    let response = server
        .get_auth(&format!("/poll/{}", handshake.connection_id), &token)
        .await
        .unwrap();
    assert_status(response, StatusCode::GONE).await.unwrap();
}

#[tokio::test]
async fn test_mixed_transports_share_rooms() {
    let server = start().await;
    let user = unique("u");
    let team = unique("team");
    let mut ws = server.connect(&user, Some(&team)).await.unwrap();
    let token = token_for(&user, Some(&team));
    let handshake = open(&server, &token).await;
    poll(&server, &handshake.connection_id, &token).await;

    let response = server
        .post(
            &format!("{API}/deliveries/room"),
            &Broadcast {
                room_id: &format!("team:{team}"),
                event_type: "alert",
                payload: json!({}),
            },
        )
        .await
        .unwrap();
    let result: RoomDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(result.recipient_count, 2);

    assert_eq!(ws.recv_dispatch().await.unwrap()["t"], "alert");
    let frames = poll(&server, &handshake.connection_id, &token).await;
    assert_eq!(frames[0]["t"], "alert");

    let response = server.get(&format!("{API}/stats")).await.unwrap();
    let stats: StatsResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(stats.by_transport["websocket"], 1);
    assert_eq!(stats.by_transport["polling"], 1);
    assert_eq!(stats.by_team[&team], 2);
}

#[tokio::test]
async fn test_polling_can_be_disabled() {
    let server = TestServer::start_with(|config| {
        config.transport.enabled = vec![TransportKind::WebSocket];
    })
    .await
    .unwrap();

    let response = server
        .post_auth("/poll", &token_for("u1", None))
        .await
        .unwrap();
    assert_eq!(
        assert_error(response, StatusCode::NOT_FOUND).await.unwrap(),
        "TRANSPORT_DISABLED"
    );
}
