//! Process-wide connectivity signal.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

const EDGE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_online: bool,
    pub last_online_at: Option<DateTime<Utc>>,
}

/// Cloneable handle to the connectivity state. Subscribers only hear transition edges.
#[derive(Debug, Clone)]
pub struct NetworkStatusObserver {
    status: Arc<Mutex<NetworkStatus>>,
    edges: broadcast::Sender<NetworkStatus>,
}

impl Default for NetworkStatusObserver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatusObserver {
    pub fn new(initially_online: bool) -> Self {
        let status = NetworkStatus {
            is_online: initially_online,
            last_online_at: initially_online.then(Utc::now),
        };
        let (edges, _) = broadcast::channel(EDGE_CAPACITY);

        Self {
            status: Arc::new(Mutex::new(status)),
            edges,
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.lock().expect("network status mutex poisoned")
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online
    }

    /// Records the host's connectivity. Returns `true` when this was a transition edge;
    /// repeated reports of the same state are ignored.
    pub fn set_online(&self, online: bool) -> bool {
        let mut status = self.status.lock().expect("network status mutex poisoned");
        if status.is_online == online {
            return false;
        }

        status.is_online = online;
        if online {
            status.last_online_at = Some(Utc::now());
        }

        // Sent under the lock so subscribers observe edges in order.
        let _ = self.edges.send(*status);
        info!(online, "connectivity changed");
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatus> {
        self.edges.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transitions_are_published() {
        let observer = NetworkStatusObserver::new(true);
        let mut edges = observer.subscribe();

        assert!(!observer.set_online(true));
        assert!(observer.set_online(false));
        assert!(!observer.set_online(false));
        assert!(observer.set_online(true));

        assert!(!edges.try_recv().expect("offline edge").is_online);
        assert!(edges.try_recv().expect("online edge").is_online);
        assert!(edges.try_recv().is_err());
    }

    #[test]
    fn last_online_at_survives_going_offline() {
        let observer = NetworkStatusObserver::new(true);
        let before = observer.status().last_online_at;
        assert!(before.is_some());

        observer.set_online(false);
        assert_eq!(observer.status().last_online_at, before);
        assert!(!observer.is_online());
    }

    #[test]
    fn starting_offline_has_no_last_online_time() {
        let observer = NetworkStatusObserver::new(false);
        assert_eq!(observer.status().last_online_at, None);
    }
}
