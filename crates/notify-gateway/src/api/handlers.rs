//! Control-plane HTTP handlers
//!
//! Thin adapters from JSON requests to `DeliveryService` calls. Argument checks
//! live in the service; the `validator` rules here reject obviously malformed
//! bodies before they reach it.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use super::extractors::{OptionalValidatedJson, ValidatedJson};
use super::response::ApiResult;
use crate::delivery::{
    ConnectionStats, DeliveryStats, DisconnectOutcome, MembershipChange, MultiUserDelivery,
    RoomDelivery, RoomInfo, UserDelivery, UserPresence,
};
use crate::server::GatewayState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToUserRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToUsersRequest {
    #[validate(length(min = 1))]
    pub user_ids: Vec<String>,
    #[validate(length(min = 1))]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[validate(length(min = 1))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    #[validate(length(max = 512))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub team_id: Option<String>,
}

/// POST /deliveries/user
pub async fn send_to_user(
    State(state): State<GatewayState>,
    ValidatedJson(body): ValidatedJson<SendToUserRequest>,
) -> ApiResult<Json<UserDelivery>> {
    let result = state
        .delivery()
        .send_to_user(&body.user_id, &body.event_type, &body.payload)?;
    Ok(Json(result))
}

/// POST /deliveries/users
pub async fn send_to_users(
    State(state): State<GatewayState>,
    ValidatedJson(body): ValidatedJson<SendToUsersRequest>,
) -> ApiResult<Json<MultiUserDelivery>> {
    let result = state
        .delivery()
        .send_to_users(&body.user_ids, &body.event_type, &body.payload)?;
    Ok(Json(result))
}

/// POST /deliveries/room
pub async fn broadcast_to_room(
    State(state): State<GatewayState>,
    ValidatedJson(body): ValidatedJson<BroadcastRequest>,
) -> ApiResult<Json<RoomDelivery>> {
    let result = state
        .delivery()
        .broadcast_to_room(&body.room_id, &body.event_type, &body.payload)?;
    Ok(Json(result))
}

/// GET /users/:user_id/connections
pub async fn user_connections(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserPresence>> {
    Ok(Json(state.delivery().is_user_connected(&user_id)?))
}

/// POST /users/:user_id/disconnect
pub async fn disconnect_user(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
    OptionalValidatedJson(body): OptionalValidatedJson<DisconnectRequest>,
) -> ApiResult<Json<DisconnectOutcome>> {
    let reason = body.unwrap_or_default().reason;
    let result = state
        .delivery()
        .disconnect_user(&user_id, reason.as_deref())?;
    Ok(Json(result))
}

/// POST /rooms/:room_id/members
pub async fn join_room(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<JoinRoomRequest>,
) -> ApiResult<Json<MembershipChange>> {
    let result = state
        .delivery()
        .join_user_to_room(&body.user_id, &room_id)?;
    Ok(Json(result))
}

/// DELETE /rooms/:room_id/members/:user_id
pub async fn leave_room(
    State(state): State<GatewayState>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<MembershipChange>> {
    let result = state
        .delivery()
        .remove_user_from_room(&user_id, &room_id)?;
    Ok(Json(result))
}

/// GET /rooms/:room_id
pub async fn get_room(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomInfo>> {
    Ok(Json(state.delivery().get_room(&room_id)?))
}

/// GET /stats
pub async fn connection_stats(
    State(state): State<GatewayState>,
    Query(query): Query<StatsQuery>,
) -> Json<ConnectionStats> {
    let team_id = query.team_id.as_deref().filter(|t| !t.trim().is_empty());
    Json(state.delivery().get_connection_stats(team_id))
}

/// GET /stats/deliveries
pub async fn delivery_stats(State(state): State<GatewayState>) -> Json<DeliveryStats> {
    Json(state.delivery().delivery_stats())
}
