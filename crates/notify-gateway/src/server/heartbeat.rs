//! Heartbeat monitor
//!
//! One background task sweeps the connection registry every heartbeat interval and
//! disconnects anything idle past the timeout, for both transports.

use crate::connection::CloseReason;
use crate::server::GatewayState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct HeartbeatMonitor;

impl HeartbeatMonitor {
    /// Start sweeping until `shutdown` flips or its sender is dropped
    pub fn spawn(state: GatewayState, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(state.transport().heartbeat_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::sweep(&state);
                    }
                    _ = shutdown.changed() => break,
                }
            }

            tracing::debug!("Heartbeat monitor stopped");
        })
    }

    /// Disconnect stale connections, returning how many were closed
    pub fn sweep(state: &GatewayState) -> usize {
        let timeout = state.transport().heartbeat_timeout();

        let closed = state
            .connections()
            .stale_connections(timeout)
            .iter()
            .filter(|connection| {
                tracing::info!(
                    connection_id = %connection.id(),
                    user_id = %connection.user_id(),
                    transport = %connection.transport(),
                    idle_ms = u64::try_from(connection.idle_for().as_millis()).unwrap_or(u64::MAX),
                    "Heartbeat timeout"
                );
                state
                    .hub()
                    .disconnect(connection.id(), CloseReason::HeartbeatTimeout)
            })
            .count();

        let pruned = state.poll_sessions().prune(state.connections());
        if closed > 0 || pruned > 0 {
            tracing::debug!(closed, pruned, "Heartbeat sweep");
        }
        closed
    }
}
