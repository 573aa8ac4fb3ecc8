//! Test fixtures and data generators
//!
//! Token minting and request bodies shared by the integration tests.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Secret the test servers verify tokens with
pub const TEST_SECRET: &str = "integration-test-secret-key";

/// Unique id so parallel tests never share users or rooms
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Mint a valid HS256 token for a user, optionally scoped to a team
pub fn token_for(user_id: &str, team_id: Option<&str>) -> String {
    let mut claims = json!({
        "sub": user_id,
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + 3600,
    });
    if let Some(team_id) = team_id {
        claims["team_id"] = json!(team_id);
    }
    sign(&claims, TEST_SECRET)
}

/// Mint a token that expired ten minutes ago
pub fn expired_token(user_id: &str) -> String {
    sign(
        &json!({"sub": user_id, "exp": Utc::now().timestamp() - 600}),
        TEST_SECRET,
    )
}

/// Mint a token signed with a different secret
pub fn foreign_token(user_id: &str) -> String {
    sign(
        &json!({"sub": user_id, "exp": Utc::now().timestamp() + 3600}),
        "some-other-secret",
    )
}

fn sign(claims: &Value, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToUser<'a> {
    pub user_id: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToUsers<'a> {
    pub user_ids: Vec<&'a str>,
    pub event_type: &'a str,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast<'a> {
    pub room_id: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeliveryResponse {
    pub delivered: bool,
    pub connection_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiUserDeliveryResponse {
    pub total_users: usize,
    pub delivered_count: usize,
    pub connections_by_user: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDeliveryResponse {
    pub delivered: bool,
    pub recipient_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub is_connected: bool,
    pub connection_count: usize,
    pub connection_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub disconnected_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: String,
    pub exists: bool,
    pub room_type: Option<String>,
    pub member_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: usize,
    pub by_transport: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_team: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHandshakeResponse {
    pub connection_id: String,
    pub heartbeat_interval: u64,
    pub poll_wait: u64,
}
