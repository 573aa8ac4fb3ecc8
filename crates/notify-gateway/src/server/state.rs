//! Gateway state
//!
//! Shared dependencies handed to every route. Cheap to clone.

use super::polling::PollSessions;
use crate::api::ApiError;
use crate::auth::AuthGate;
use crate::connection::{ConnectionRegistry, ConnectionSlot, ConnectionSlots};
use crate::delivery::{DeliveryQueue, DeliveryService};
use crate::hub::ConnectionHub;
use crate::rooms::RoomRegistry;
use axum::http::{header, HeaderMap};
use notify_common::{AppConfig, TokenVerifier, TransportConfig, TransportKind};
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    config: Arc<AppConfig>,
    hub: Arc<ConnectionHub>,
    auth_gate: Arc<AuthGate>,
    slots: Arc<ConnectionSlots>,
    poll_sessions: Arc<PollSessions>,
    delivery: Arc<DeliveryService>,
    queue: Arc<DeliveryQueue>,
}

impl GatewayState {
    /// Build the registries and services for a configuration
    ///
    /// Spawns the delivery queue worker, so it must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let connections = ConnectionRegistry::new_shared();
        let rooms = RoomRegistry::new_shared();
        let hub = Arc::new(ConnectionHub::new(
            connections,
            rooms,
            config.transport.outbound_buffer,
        ));
        let queue = DeliveryQueue::start(config.delivery.queue_capacity);
        let delivery = Arc::new(DeliveryService::new(Arc::clone(&hub), Arc::clone(&queue)));
        let auth_gate = Arc::new(AuthGate::new(TokenVerifier::new(
            &config.jwt.secret,
            config.jwt.leeway_secs,
        )));

        Self {
            slots: ConnectionSlots::new(config.transport.max_connections),
            poll_sessions: Arc::new(PollSessions::default()),
            config: Arc::new(config),
            hub,
            auth_gate,
            delivery,
            queue,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.config.transport
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        self.hub.connections()
    }

    pub fn rooms(&self) -> &RoomRegistry {
        self.hub.rooms()
    }

    pub fn auth_gate(&self) -> &AuthGate {
        &self.auth_gate
    }

    pub fn slots(&self) -> &ConnectionSlots {
        &self.slots
    }

    pub fn poll_sessions(&self) -> &PollSessions {
        &self.poll_sessions
    }

    pub fn delivery(&self) -> &DeliveryService {
        &self.delivery
    }

    pub fn delivery_queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    /// Pre-authentication checks for a new connection
    ///
    /// Checks run in order: transport enabled, origin allowed, ceiling not reached.
    /// The returned slot must be held for the lifetime of the connection.
    ///
    /// # Errors
    /// Returns the rejection to send back instead of upgrading.
    pub fn admit(
        &self,
        transport: TransportKind,
        headers: &HeaderMap,
    ) -> Result<ConnectionSlot, ApiError> {
        let config = self.transport();
        if !config.is_enabled(transport) {
            return Err(ApiError::TransportDisabled(transport));
        }

        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        if !config.is_origin_allowed(origin) {
            tracing::warn!(
                origin = origin.unwrap_or(""),
                transport = %transport,
                "Origin rejected"
            );
            return Err(ApiError::OriginNotAllowed);
        }

        self.slots.try_acquire().ok_or_else(|| {
            tracing::warn!(
                max_connections = self.slots.max(),
                transport = %transport,
                "Connection ceiling reached"
            );
            ApiError::CapacityExceeded
        })
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("connections", self.hub.connections())
            .field("rooms", self.hub.rooms())
            .field("slots_in_use", &self.slots.in_use())
            .finish_non_exhaustive()
    }
}
