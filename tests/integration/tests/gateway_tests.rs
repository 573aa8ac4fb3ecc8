//! WebSocket transport and control-plane integration tests
//!
//! Each test spawns its own in-process gateway on an ephemeral port.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use integration_tests::*;
use notify_common::TransportKind;
use reqwest::StatusCode;
use serde_json::json;
use tokio_tungstenite::tungstenite;

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.unwrap();
    let response = server.get("/health").await.unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();
}

#[tokio::test]
async fn test_health_ready_reports_counts() {
    let server = TestServer::start().await.unwrap();
    let _client = server.connect(&unique("u"), Some("t1")).await.unwrap();

    let response = server.get("/health/ready").await.unwrap();
    let body: serde_json::Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["rooms"], 2);
    assert_eq!(body["deliveryQueueOpen"], true);
}

// ============================================================================
// Handshake and Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_ready_lists_default_rooms() {
    let server = TestServer::start().await.unwrap();
    let client = server.connect("u1", Some("t1")).await.unwrap();

    assert_eq!(client.ready["userId"], "u1");
    assert_eq!(client.ready["rooms"], json!(["user:u1", "team:t1"]));
    assert!(!client.connection_id().is_empty());
    assert!(server.state.connections().is_user_connected("u1"));
}

#[tokio::test]
async fn test_ready_without_team_joins_only_user_room() {
    let server = TestServer::start().await.unwrap();
    let user = unique("solo");
    let client = server.connect(&user, None).await.unwrap();

    assert_eq!(client.ready["rooms"], json!([format!("user:{user}")]));
}

#[tokio::test]
async fn test_identify_frame_authenticates() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");

    let mut client = WsClient::open(&server.ws_url(None), None).await.unwrap();
    client.expect_hello().await.unwrap();
    client.identify(&token_for(&user, Some("t9"))).await.unwrap();

    let ready = client.recv_dispatch().await.unwrap();
    assert_eq!(ready["t"], "ready");
    assert_eq!(ready["s"], 1);
    assert_eq!(ready["d"]["rooms"], json!([format!("user:{user}"), "team:t9"]));
}

#[tokio::test]
async fn test_bearer_header_authenticates() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let server = TestServer::start().await.unwrap();
    let user = unique("u");

    let mut request = server.ws_url(None).into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token_for(&user, None)).parse().unwrap(),
    );
    let (_socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    assert!(eventually(|| server.state.connections().is_user_connected(&user)).await);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let token = expired_token("u1");

    let mut client = WsClient::open(&server.ws_url(Some(&token)), None).await.unwrap();
    client.expect_hello().await.unwrap();
    let (code, reason) = client.expect_close().await.unwrap();

    assert_eq!(code, 4004);
    assert_eq!(reason, "Token expired");
    assert_eq!(server.state.connections().count(), 0);
}

#[tokio::test]
async fn test_malformed_and_foreign_tokens_are_rejected() {
    let server = TestServer::start().await.unwrap();

    for token in ["not-a-jwt".to_string(), foreign_token("u1")] {
        let mut client = WsClient::open(&server.ws_url(Some(&token)), None).await.unwrap();
        client.expect_hello().await.unwrap();
        let (code, _) = client.expect_close().await.unwrap();
        assert_eq!(code, 4004);
    }
    assert_eq!(server.state.connections().count(), 0);
}

#[tokio::test]
async fn test_identify_deadline_closes_socket() {
    let server = TestServer::start_with(|config| config.transport.auth_timeout_ms = 100)
        .await
        .unwrap();

    let mut client = WsClient::open(&server.ws_url(None), None).await.unwrap();
    client.expect_hello().await.unwrap();
    let (code, _) = client.expect_close().await.unwrap();

    assert_eq!(code, 4003);
}

#[tokio::test]
async fn test_disallowed_origin_is_refused_before_upgrade() {
    let server = TestServer::start_with(|config| {
        config.transport.allowed_origins = vec!["https://app.example.com".to_string()];
    })
    .await
    .unwrap();
    let url = server.ws_url(Some(&token_for("u1", None)));

    let err = WsClient::open(&url, Some("https://evil.example.com"))
        .await
        .err()
        .unwrap();
    match err.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }

    let mut client = WsClient::open(&url, Some("https://app.example.com")).await.unwrap();
    client.expect_hello().await.unwrap();
}

#[tokio::test]
async fn test_connection_ceiling_returns_503() {
    let server = TestServer::start_with(|config| config.transport.max_connections = 1)
        .await
        .unwrap();
    let first = server.connect(&unique("u"), None).await.unwrap();

    let err = WsClient::open(&server.ws_url(Some(&token_for("u2", None))), None)
        .await
        .err()
        .unwrap();
    match err.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }

    first.close().await.unwrap();
    assert!(eventually(|| server.state.slots().in_use() == 0).await);
    server.connect(&unique("u"), None).await.unwrap();
}

#[tokio::test]
async fn test_disabled_transport_is_not_found() {
    let server = TestServer::start_with(|config| {
        config.transport.enabled = vec![TransportKind::Polling];
    })
    .await
    .unwrap();

    let err = WsClient::open(&server.ws_url(Some(&token_for("u1", None))), None)
        .await
        .err()
        .unwrap();
    match err.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

// ============================================================================
// Frame Protocol Tests
// ============================================================================

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect(&unique("u"), None).await.unwrap();

    client.heartbeat().await.unwrap();
    let ack = client.recv_json().await.unwrap();
    assert_eq!(ack["op"], 11);
}

#[tokio::test]
async fn test_protocol_violations_close_with_codes() {
    let server = TestServer::start().await.unwrap();

    let cases = [
        (r#"{"op": 99}"#.to_string(), 4001),
        ("{not json".to_string(), 4002),
        (
            json!({"op": 2, "d": {"token": token_for("u1", None)}}).to_string(),
            4005,
        ),
    ];

    for (frame, expected) in cases {
        let user = unique("u");
        let mut client = server.connect(&user, None).await.unwrap();
        client.send_raw(&frame).await.unwrap();

        let (code, _) = client.expect_close().await.unwrap();
        assert_eq!(code, expected, "frame {frame}");
        assert!(eventually(|| !server.state.connections().is_user_connected(&user)).await);
    }
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    let server = TestServer::start_with(|config| {
        config.transport.heartbeat_interval_ms = 20;
        config.transport.heartbeat_timeout_ms = 60;
    })
    .await
    .unwrap();
    let user = unique("u");
    let mut client = server.connect(&user, Some("t1")).await.unwrap();

    let (code, reason) = client.expect_close().await.unwrap();
    assert_eq!(code, 4009);
    assert_eq!(reason, "heartbeat timeout");
    assert!(!server.state.connections().is_user_connected(&user));
}

#[tokio::test]
async fn test_client_close_cleans_up_rooms() {
    let server = TestServer::start().await.unwrap();
    let team = unique("team");
    let user = unique("u");
    let staying = server.connect(&unique("u"), Some(&team)).await.unwrap();
    let leaving = server.connect(&user, Some(&team)).await.unwrap();

    let team_room = format!("team:{team}");
    assert_eq!(server.state.rooms().member_count(&team_room), 2);

    leaving.close().await.unwrap();

    assert!(eventually(|| server.state.rooms().member_count(&team_room) == 1).await);
    assert!(!server.state.connections().is_user_connected(&user));
    assert_eq!(server.state.rooms().member_count(&format!("user:{user}")), 0);
    drop(staying);
}

#[tokio::test]
async fn test_graceful_shutdown_closes_clients() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect(&unique("u"), None).await.unwrap();

    let close = tokio::spawn(async move { client.expect_close().await });
    server.stop().await.unwrap();

    let (code, reason) = close.await.unwrap().unwrap();
    assert_eq!(code, 4010);
    assert_eq!(reason, "server shutting down");
}

// ============================================================================
// Control Plane Tests
// ============================================================================

#[tokio::test]
async fn test_send_to_user_reaches_every_connection() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let mut first = server.connect(&user, Some("t1")).await.unwrap();
    let mut second = server.connect(&user, Some("t1")).await.unwrap();

    let response = server
        .post(
            &format!("{API}/deliveries/user"),
            &SendToUser {
                user_id: &user,
                event_type: "notify",
                payload: json!({"m": "hi"}),
            },
        )
        .await
        .unwrap();
    let result: UserDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(result.delivered);
    assert_eq!(result.connection_count, 2);

    for client in [&mut first, &mut second] {
        let frame = client.recv_dispatch().await.unwrap();
        assert_eq!(frame["t"], "notify");
        assert_eq!(frame["s"], 2);
        assert_eq!(frame["d"], json!({"m": "hi"}));
    }
}

#[tokio::test]
async fn test_send_to_offline_user() {
    let server = TestServer::start().await.unwrap();

    let response = server
        .post(
            &format!("{API}/deliveries/user"),
            &SendToUser {
                user_id: "ghost",
                event_type: "notify",
                payload: json!({}),
            },
        )
        .await
        .unwrap();
    let result: UserDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(!result.delivered);
    assert_eq!(result.connection_count, 0);
}

#[tokio::test]
async fn test_send_to_users_reports_per_user() {
    let server = TestServer::start().await.unwrap();
    let online = unique("u");
    let mut client = server.connect(&online, None).await.unwrap();

    let response = server
        .post(
            &format!("{API}/deliveries/users"),
            &SendToUsers {
                user_ids: vec![&online, "ghost", &online],
                event_type: "digest",
                payload: json!({"count": 3}),
            },
        )
        .await
        .unwrap();
    let result: MultiUserDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(result.total_users, 2);
    assert_eq!(result.delivered_count, 1);
    assert_eq!(result.connections_by_user[&online], 1);
    assert_eq!(result.connections_by_user["ghost"], 0);

    let frame = client.recv_dispatch().await.unwrap();
    assert_eq!(frame["t"], "digest");
    client.expect_silence(Duration::from_millis(100)).await.unwrap();
}

#[tokio::test]
async fn test_broadcast_to_team_room() {
    let server = TestServer::start().await.unwrap();
    let team = unique("team");
    let room = format!("team:{team}");
    let mut members = Vec::new();
    for _ in 0..3 {
        members.push(server.connect(&unique("u"), Some(&team)).await.unwrap());
    }
    let mut outsider = server.connect(&unique("u"), Some("other")).await.unwrap();

    let response = server
        .post(
            &format!("{API}/deliveries/room"),
            &Broadcast {
                room_id: &room,
                event_type: "alert",
                payload: json!({"level": "high"}),
            },
        )
        .await
        .unwrap();
    let result: RoomDeliveryResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(result.delivered);
    assert_eq!(result.recipient_count, 3);

    for member in &mut members {
        let frame = member.recv_dispatch().await.unwrap();
        assert_eq!(frame["t"], "alert");
        assert_eq!(frame["d"]["level"], "high");
    }
    outsider.expect_silence(Duration::from_millis(100)).await.unwrap();
}

#[tokio::test]
async fn test_user_presence() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let client = server.connect(&user, None).await.unwrap();

    let response = server
        .get(&format!("{API}/users/{user}/connections"))
        .await
        .unwrap();
    let presence: PresenceResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(presence.is_connected);
    assert_eq!(presence.connection_count, 1);
    assert_eq!(presence.connection_ids, vec![client.connection_id()]);

    let response = server.get(&format!("{API}/users/ghost/connections")).await.unwrap();
    let presence: PresenceResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(!presence.is_connected);
    assert_eq!(presence.connection_count, 0);
}

#[tokio::test]
async fn test_disconnect_user_closes_every_connection() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let mut first = server.connect(&user, Some("t1")).await.unwrap();
    let mut second = server.connect(&user, Some("t1")).await.unwrap();

    let response = server
        .post(
            &format!("{API}/users/{user}/disconnect"),
            &json!({"reason": "policy"}),
        )
        .await
        .unwrap();
    let result: DisconnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(result.disconnected_count, 2);

    for client in [&mut first, &mut second] {
        let (code, reason) = client.expect_close().await.unwrap();
        assert_eq!(code, 4010);
        assert_eq!(reason, "policy");
    }

    let response = server
        .get(&format!("{API}/users/{user}/connections"))
        .await
        .unwrap();
    let presence: PresenceResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(!presence.is_connected);
}

#[tokio::test]
async fn test_disconnect_without_body_uses_default_reason() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let mut client = server.connect(&user, None).await.unwrap();

    let response = server
        .client
        .post(format!("{}{API}/users/{user}/disconnect", server.base_url()))
        .send()
        .await
        .unwrap();
    let result: DisconnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(result.disconnected_count, 1);

    let (_, reason) = client.expect_close().await.unwrap();
    assert_eq!(reason, "disconnected by server");
}

#[tokio::test]
async fn test_custom_room_membership() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let room = unique("project");
    let mut client = server.connect(&user, None).await.unwrap();

    let response = server
        .post(
            &format!("{API}/rooms/{room}/members"),
            &json!({"userId": user}),
        )
        .await
        .unwrap();
    let change: serde_json::Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(change["affectedConnections"], 1);

    let response = server.get(&format!("{API}/rooms/{room}")).await.unwrap();
    let info: RoomResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(info.exists);
    assert_eq!(info.room_id, room);
    assert_eq!(info.room_type.as_deref(), Some("custom"));
    assert_eq!(info.member_count, 1);

    let response = server
        .post(
            &format!("{API}/deliveries/room"),
            &Broadcast {
                room_id: &room,
                event_type: "update",
                payload: json!({"v": 1}),
            },
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();
    assert_eq!(client.recv_dispatch().await.unwrap()["t"], "update");

    let response = server
        .delete(&format!("{API}/rooms/{room}/members/{user}"))
        .await
        .unwrap();
    let change: serde_json::Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(change["affectedConnections"], 1);

    let response = server.get(&format!("{API}/rooms/{room}")).await.unwrap();
    let info: RoomResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(!info.exists);
    assert_eq!(info.member_count, 0);
}

#[tokio::test]
async fn test_reserved_rooms_cannot_be_managed() {
    let server = TestServer::start().await.unwrap();

    let response = server
        .post(&format!("{API}/rooms/team:t1/members"), &json!({"userId": "u1"}))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let mut client = server.connect(&user, None).await.unwrap();

    let bodies = [
        (
            format!("{API}/deliveries/user"),
            json!({"userId": "", "eventType": "x"}),
        ),
        (
            format!("{API}/deliveries/user"),
            json!({"userId": "   ", "eventType": "x"}),
        ),
        (
            format!("{API}/deliveries/user"),
            json!({"userId": user, "eventType": " "}),
        ),
        (format!("{API}/deliveries/user"), json!({"userId": user})),
        (
            format!("{API}/deliveries/users"),
            json!({"userIds": [], "eventType": "x"}),
        ),
        (
            format!("{API}/deliveries/users"),
            json!({"userIds": [user, ""], "eventType": "x"}),
        ),
        (
            format!("{API}/deliveries/room"),
            json!({"roomId": "", "eventType": "x"}),
        ),
    ];

    for (path, body) in bodies {
        let response = server.post(&path, &body).await.unwrap();
        let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
        assert_eq!(code, "INVALID_ARGUMENT", "body {body}");
    }

    client.expect_silence(Duration::from_millis(100)).await.unwrap();
}

#[tokio::test]
async fn test_connection_stats() {
    let server = TestServer::start().await.unwrap();
    let team = unique("team");
    let _a = server.connect(&unique("u"), Some(&team)).await.unwrap();
    let _b = server.connect(&unique("u"), Some(&team)).await.unwrap();
    let _c = server.connect(&unique("u"), None).await.unwrap();

    let response = server.get(&format!("{API}/stats")).await.unwrap();
    let stats: StatsResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_transport["websocket"], 3);
    assert_eq!(stats.by_transport["polling"], 0);
    assert_eq!(stats.by_team[&team], 2);

    let response = server
        .get(&format!("{API}/stats?teamId={team}"))
        .await
        .unwrap();
    let stats: StatsResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(stats.total, 2);
}

#[tokio::test]
async fn test_delivery_stats_count_calls() {
    let server = TestServer::start().await.unwrap();
    let user = unique("u");
    let _client = server.connect(&user, None).await.unwrap();

    for _ in 0..2 {
        let response = server
            .post(
                &format!("{API}/deliveries/user"),
                &SendToUser {
                    user_id: &user,
                    event_type: "ping",
                    payload: json!(null),
                },
            )
            .await
            .unwrap();
        assert_status(response, StatusCode::OK).await.unwrap();
    }

    let delivery_queue = server.state.delivery_queue().clone();
    assert!(eventually(|| delivery_queue.stats().messages_emitted == 2).await);

    let response = server.get(&format!("{API}/stats/deliveries")).await.unwrap();
    let stats: serde_json::Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(stats["recorded"], 2);
    assert_eq!(stats["messagesEmitted"], 2);
    assert_eq!(stats["dropped"], 0);
}
