use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::data::{ApplicationId, FormData};
use super::local::{LocalStore, StorageError};
use super::remote::SyncTarget;
use crate::network::NetworkStatusObserver;

/// Reconciliation state between local durable storage and the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Local,
    Syncing,
}

impl SyncStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Local => "local",
            SyncStatus::Syncing => "syncing",
        }
    }
}

/// User-facing notice attached to an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreNotice {
    SavedOffline,
}

impl StoreNotice {
    pub const fn message(self) -> &'static str {
        match self {
            StoreNotice::SavedOffline => {
                "Changes saved locally and will sync when you're back online."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<StoreNotice>,
}

/// Process-wide round serializer keyed by application id. Every store opened for the same
/// application shares one slot, so a reopened session never pushes while its predecessor's
/// round is still in flight.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    slots: Arc<Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SyncGate {
    fn slot(&self, application_id: &ApplicationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().expect("sync gate mutex poisoned");
        Arc::clone(slots.entry(application_id.clone()).or_default())
    }
}

/// Owns the in-progress form of one application. Every edit is written to local storage
/// before any remote attempt; at most one sync round is in flight at a time.
#[derive(Clone)]
pub struct FormDataStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    application_id: ApplicationId,
    storage_key: String,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn SyncTarget>,
    network: NetworkStatusObserver,
    round: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<StoreState>,
}

struct StoreState {
    data: FormData,
    revision: u64,
    changed: bool,
    status: SyncStatus,
    in_flight: bool,
}

impl FormDataStore {
    /// Opens the store, resuming from any snapshot already in local storage.
    pub fn open(
        application_id: ApplicationId,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn SyncTarget>,
        network: NetworkStatusObserver,
        gate: &SyncGate,
    ) -> Result<Self, StorageError> {
        let storage_key = application_id.storage_key();
        let round = gate.slot(&application_id);
        let data = local.load(&storage_key)?.unwrap_or_default();
        debug!(
            application_id = %application_id,
            fields = data.len(),
            "form data store opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                application_id,
                storage_key,
                local,
                remote,
                network,
                round,
                state: Mutex::new(StoreState {
                    data,
                    revision: 0,
                    changed: false,
                    status: SyncStatus::Synced,
                    in_flight: false,
                }),
            }),
        })
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.inner.application_id
    }

    pub fn get(&self) -> FormData {
        self.inner.lock().data.clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.lock().status
    }

    /// Whether edits exist that the remote has not acknowledged.
    pub fn has_pending_changes(&self) -> bool {
        self.inner.lock().changed
    }

    pub fn update_field(
        &self,
        field: impl Into<String>,
        value: Value,
    ) -> Result<UpdateOutcome, StorageError> {
        let field = field.into();
        let mut state = self.inner.lock();
        state.data = state.data.with_field(field.as_str(), value);
        state.revision += 1;
        state.changed = true;

        // Persisted under the lock so the newest snapshot is always the last one written.
        self.inner
            .local
            .save(&self.inner.storage_key, &state.data)
            .map_err(|err| {
                warn!(
                    application_id = %self.inner.application_id,
                    field = %field,
                    error = %err,
                    "failed to persist form snapshot locally"
                );
                err
            })?;

        if !self.inner.network.is_online() {
            state.status = SyncStatus::Local;
            info!(
                application_id = %self.inner.application_id,
                field = %field,
                "offline edit kept in local storage"
            );
            return Ok(UpdateOutcome {
                status: SyncStatus::Local,
                notice: Some(StoreNotice::SavedOffline),
            });
        }

        self.inner.begin_sync(&mut state);
        Ok(UpdateOutcome {
            status: state.status,
            notice: None,
        })
    }

    /// Reacts to a connectivity edge. Coming back online with local-only edits triggers
    /// one sync round; returns whether a round was started.
    pub fn handle_connectivity(&self, online: bool) -> bool {
        if !online {
            return false;
        }

        let mut state = self.inner.lock();
        if state.status != SyncStatus::Local {
            return false;
        }

        info!(
            application_id = %self.inner.application_id,
            "back online; syncing local edits"
        );
        self.inner.begin_sync(&mut state)
    }
}

impl StoreInner {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("form store mutex poisoned")
    }

    /// Starts a sync round unless one is already in flight. The running round picks up
    /// any newer revision before it reports `synced`.
    fn begin_sync(self: &Arc<Self>, state: &mut StoreState) -> bool {
        state.status = SyncStatus::Syncing;
        if state.in_flight {
            debug!(
                application_id = %self.application_id,
                "sync already in flight; newer snapshot follows it"
            );
            return false;
        }

        state.in_flight = true;
        tokio::spawn(Arc::clone(self).run_sync());
        true
    }

    async fn run_sync(self: Arc<Self>) {
        loop {
            // Held across the push: one attempt per application id at a time.
            let _round = self.round.lock().await;
            let revision = self.lock().revision;
            let snapshot = self.latest_snapshot();
            let result = self.remote.push(&self.application_id, &snapshot).await;

            let mut state = self.lock();
            match result {
                Ok(()) if state.revision == revision => {
                    state.status = SyncStatus::Synced;
                    state.changed = false;
                    state.in_flight = false;
                    info!(
                        application_id = %self.application_id,
                        revision,
                        "form data synced"
                    );
                    return;
                }
                Ok(()) if !self.network.is_online() => {
                    state.status = SyncStatus::Local;
                    state.in_flight = false;
                    debug!(
                        application_id = %self.application_id,
                        "newer edits pending while offline; waiting for reconnect"
                    );
                    return;
                }
                Ok(()) => {
                    debug!(
                        application_id = %self.application_id,
                        pushed = revision,
                        latest = state.revision,
                        "newer edits arrived during sync; pushing latest snapshot"
                    );
                }
                Err(err) => {
                    state.status = SyncStatus::Local;
                    state.in_flight = false;
                    warn!(
                        application_id = %self.application_id,
                        error = %err,
                        "sync failed; edits remain in local storage"
                    );
                    return;
                }
            }
        }
    }

    /// Re-reads local storage at commit time rather than trusting a captured copy.
    fn latest_snapshot(&self) -> FormData {
        match self.local.load(&self.storage_key) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => self.lock().data.clone(),
            Err(err) => {
                warn!(
                    application_id = %self.application_id,
                    error = %err,
                    "local snapshot unreadable; syncing in-memory copy"
                );
                self.lock().data.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::local::MemoryLocalStore;
    use crate::forms::remote::SimulatedSyncTarget;
    use serde_json::json;
    use std::time::Duration;

    const LATENCY: Duration = Duration::from_millis(1000);

    struct Fixture {
        store: FormDataStore,
        local: Arc<MemoryLocalStore>,
        remote: Arc<SimulatedSyncTarget>,
        network: NetworkStatusObserver,
        gate: SyncGate,
    }

    impl Fixture {
        fn reopen(&self) -> FormDataStore {
            FormDataStore::open(
                ApplicationId::from("app-1"),
                self.local.clone(),
                self.remote.clone(),
                self.network.clone(),
                &self.gate,
            )
            .expect("store reopens")
        }
    }

    fn fixture(online: bool) -> Fixture {
        let local = Arc::new(MemoryLocalStore::default());
        let remote = Arc::new(SimulatedSyncTarget::new(LATENCY));
        let network = NetworkStatusObserver::new(online);
        let gate = SyncGate::default();
        let store = FormDataStore::open(
            ApplicationId::from("app-1"),
            local.clone(),
            remote.clone(),
            network.clone(),
            &gate,
        )
        .expect("store opens");

        Fixture {
            store,
            local,
            remote,
            network,
            gate,
        }
    }

    async fn wait(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn online_edit_syncs_after_latency() {
        let fx = fixture(true);

        let outcome = fx.store.update_field("fullName", json!("Ann")).expect("update");
        assert_eq!(outcome.status, SyncStatus::Syncing);
        assert!(outcome.notice.is_none());

        wait(LATENCY + Duration::from_millis(10)).await;
        assert_eq!(fx.store.sync_status(), SyncStatus::Synced);
        assert!(!fx.store.has_pending_changes());
        assert_eq!(fx.remote.attempts(), 1);
        assert_eq!(fx.remote.last_accepted(), Some(fx.store.get()));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_edits_are_durable_and_local() {
        let fx = fixture(false);

        fx.store.update_field("fullName", json!("Ann")).expect("update");
        let outcome = fx.store.update_field("email", json!("a@b.com")).expect("update");

        assert_eq!(outcome.status, SyncStatus::Local);
        assert_eq!(outcome.notice, Some(StoreNotice::SavedOffline));
        assert_eq!(fx.store.sync_status(), SyncStatus::Local);

        let stored = fx
            .local
            .load("formData_app-1")
            .expect("load")
            .expect("snapshot present");
        assert_eq!(stored, fx.store.get());
        assert_eq!(stored.get("email"), Some(&json!("a@b.com")));

        wait(LATENCY * 3).await;
        assert_eq!(fx.remote.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_triggers_exactly_one_sync() {
        let fx = fixture(false);
        fx.store.update_field("fullName", json!("Ann")).expect("update");
        fx.store.update_field("phone", json!("555")).expect("update");

        fx.network.set_online(true);
        assert!(fx.store.handle_connectivity(true));
        assert!(!fx.store.handle_connectivity(true));

        wait(LATENCY * 3).await;
        assert_eq!(fx.remote.attempts(), 1);
        assert_eq!(fx.store.sync_status(), SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sync_keeps_changes_local() {
        let fx = fixture(true);
        fx.remote.set_rejecting(true);

        fx.store.update_field("income", json!(5000)).expect("update");
        wait(LATENCY + Duration::from_millis(10)).await;

        assert_eq!(fx.store.sync_status(), SyncStatus::Local);
        assert!(fx.store.has_pending_changes());

        // Nothing retries on a timer.
        wait(LATENCY * 5).await;
        assert_eq!(fx.remote.attempts(), 1);

        fx.remote.set_rejecting(false);
        fx.store.update_field("income", json!(5100)).expect("update");
        wait(LATENCY + Duration::from_millis(10)).await;
        assert_eq!(fx.store.sync_status(), SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_flight_is_pushed_in_follow_up_round() {
        let fx = fixture(true);

        fx.store.update_field("fullName", json!("Ann")).expect("update");
        wait(LATENCY / 2).await;
        let outcome = fx.store.update_field("email", json!("a@b.com")).expect("update");
        assert_eq!(outcome.status, SyncStatus::Syncing);

        wait(LATENCY / 2 + Duration::from_millis(10)).await;
        assert_eq!(fx.store.sync_status(), SyncStatus::Syncing);
        assert_eq!(fx.remote.attempts(), 2);

        wait(LATENCY).await;
        assert_eq!(fx.store.sync_status(), SyncStatus::Synced);
        let accepted = fx.remote.last_accepted().expect("accepted snapshot");
        assert_eq!(accepted.get("email"), Some(&json!("a@b.com")));
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_resumes_from_local_snapshot() {
        let fx = fixture(false);
        fx.store.update_field("loanType", json!("Home")).expect("update");

        let reopened = fx.reopen();

        assert_eq!(reopened.get().get("loanType"), Some(&json!("Home")));
    }

    #[tokio::test(start_paused = true)]
    async fn reopened_store_waits_for_predecessor_round() {
        let fx = fixture(true);
        fx.store.update_field("fullName", json!("Ann")).expect("update");
        wait(LATENCY * 3 / 10).await;

        let successor = fx.reopen();
        drop(fx.store);

        let outcome = successor.update_field("email", json!("a@b.com")).expect("update");
        assert_eq!(outcome.status, SyncStatus::Syncing);
        wait(Duration::from_millis(10)).await;
        assert_eq!(fx.remote.attempts(), 1);

        // Predecessor resolves at LATENCY; the successor's push starts only then.
        wait(LATENCY).await;
        assert_eq!(fx.remote.attempts(), 2);
        assert_eq!(successor.sync_status(), SyncStatus::Syncing);

        wait(LATENCY).await;
        assert_eq!(successor.sync_status(), SyncStatus::Synced);
        let accepted = fx.remote.last_accepted().expect("accepted snapshot");
        assert_eq!(accepted.get("fullName"), Some(&json!("Ann")));
        assert_eq!(accepted.get("email"), Some(&json!("a@b.com")));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_edit_during_flight_syncs_after_reconnect() {
        let fx = fixture(true);
        fx.store.update_field("fullName", json!("Ann")).expect("update");
        wait(LATENCY * 3 / 10).await;

        fx.network.set_online(false);
        let outcome = fx.store.update_field("phone", json!("555")).expect("update");
        assert_eq!(outcome.status, SyncStatus::Local);
        assert_eq!(outcome.notice, Some(StoreNotice::SavedOffline));

        wait(LATENCY / 5).await;
        fx.network.set_online(true);
        // The first round is still running and picks the edit up itself.
        assert!(!fx.store.handle_connectivity(true));
        assert_eq!(fx.store.sync_status(), SyncStatus::Syncing);

        wait(LATENCY / 2 + Duration::from_millis(10)).await;
        assert_eq!(fx.remote.attempts(), 2);
        assert_eq!(fx.store.sync_status(), SyncStatus::Syncing);

        wait(LATENCY).await;
        assert_eq!(fx.store.sync_status(), SyncStatus::Synced);
        assert!(!fx.store.has_pending_changes());
        assert_eq!(fx.remote.attempts(), 2);
        let accepted = fx.remote.last_accepted().expect("accepted snapshot");
        assert_eq!(accepted.get("phone"), Some(&json!("555")));
    }
}
