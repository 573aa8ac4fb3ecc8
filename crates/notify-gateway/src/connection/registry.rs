//! Connection registry
//!
//! Every live connection indexed by id, by user, and by team. All three indexes sit
//! behind one `RwLock` so readers never observe a connection in one index but not
//! another.

use super::Connection;
use notify_common::TransportKind;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, Arc<Connection>>,
    by_user: HashMap<String, HashSet<String>>,
    by_team: HashMap<String, HashSet<String>>,
}

impl Indexes {
    fn collect(&self, ids: Option<&HashSet<String>>) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect();
        connections.sort_by(|a, b| {
            a.connected_at()
                .cmp(&b.connected_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        connections
    }
}

fn unindex(index: &mut HashMap<String, HashSet<String>>, key: &str, connection_id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(connection_id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Aggregate connection counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub by_transport: BTreeMap<TransportKind, usize>,
    pub by_team: BTreeMap<String, usize>,
}

/// Registry of all live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Indexes>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a connection under all indexes
    ///
    /// Returns false, leaving the registry untouched, if the id is already present.
    pub fn add_connection(&self, connection: Arc<Connection>) -> bool {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(connection.id()) {
            return false;
        }

        let id = connection.id().to_string();
        inner
            .by_user
            .entry(connection.user_id().to_string())
            .or_default()
            .insert(id.clone());
        if let Some(team_id) = connection.team_id() {
            inner
                .by_team
                .entry(team_id.to_string())
                .or_default()
                .insert(id.clone());
        }
        inner.by_id.insert(id, Arc::clone(&connection));
        drop(inner);

        tracing::debug!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            transport = %connection.transport(),
            "Connection registered"
        );
        true
    }

    /// Remove a connection from all indexes; unknown ids are a no-op
    pub fn remove_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        let connection = inner.by_id.remove(connection_id)?;

        unindex(&mut inner.by_user, connection.user_id(), connection_id);
        if let Some(team_id) = connection.team_id() {
            unindex(&mut inner.by_team, team_id, connection_id);
        }
        drop(inner);

        tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        Some(connection)
    }

    #[must_use]
    pub fn get_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.inner.read().by_id.get(connection_id).cloned()
    }

    /// Live connections of a user, oldest first
    #[must_use]
    pub fn get_user_connections(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read();
        inner.collect(inner.by_user.get(user_id))
    }

    #[must_use]
    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.inner.read().by_user.contains_key(user_id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Connection counts per transport, including transports with no connections
    #[must_use]
    pub fn count_by_transport(&self) -> BTreeMap<TransportKind, usize> {
        let inner = self.inner.read();
        let mut counts: BTreeMap<_, _> = TransportKind::ALL.iter().map(|t| (*t, 0)).collect();
        for connection in inner.by_id.values() {
            *counts.entry(connection.transport()).or_default() += 1;
        }
        counts
    }

    /// Connection counts per team; connections without a team are not counted
    #[must_use]
    pub fn count_by_team(&self) -> BTreeMap<String, usize> {
        self.inner
            .read()
            .by_team
            .iter()
            .map(|(team, ids)| (team.clone(), ids.len()))
            .collect()
    }

    /// Consistent snapshot of all counts, optionally restricted to one team
    #[must_use]
    pub fn stats(&self, team_id: Option<&str>) -> RegistryStats {
        let inner = self.inner.read();
        let mut by_transport: BTreeMap<_, _> =
            TransportKind::ALL.iter().map(|t| (*t, 0)).collect();

        match team_id {
            Some(team_id) => {
                let members = inner.collect(inner.by_team.get(team_id));
                for connection in &members {
                    *by_transport.entry(connection.transport()).or_default() += 1;
                }
                let mut by_team = BTreeMap::new();
                if !members.is_empty() {
                    by_team.insert(team_id.to_string(), members.len());
                }
                RegistryStats {
                    total: members.len(),
                    by_transport,
                    by_team,
                }
            }
            None => {
                for connection in inner.by_id.values() {
                    *by_transport.entry(connection.transport()).or_default() += 1;
                }
                RegistryStats {
                    total: inner.by_id.len(),
                    by_transport,
                    by_team: inner
                        .by_team
                        .iter()
                        .map(|(team, ids)| (team.clone(), ids.len()))
                        .collect(),
                }
            }
        }
    }

    /// Record liveness for a connection; returns false for unknown ids
    pub fn touch(&self, connection_id: &str) -> bool {
        match self.get_connection(connection_id) {
            Some(connection) => {
                connection.touch();
                true
            }
            None => false,
        }
    }

    /// Connections not heard from within `timeout`
    #[must_use]
    pub fn stale_connections(&self, timeout: Duration) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .by_id
            .values()
            .filter(|c| c.is_stale(timeout))
            .cloned()
            .collect()
    }

    /// Every live connection, used for shutdown
    #[must_use]
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.inner.read().by_id.values().cloned().collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConnectionRegistry")
            .field("connections", &inner.by_id.len())
            .field("users", &inner.by_user.len())
            .field("teams", &inner.by_team.len())
            .finish()
    }
}
