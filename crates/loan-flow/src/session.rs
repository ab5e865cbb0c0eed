//! One application's engine: form store, workflow position, task monitors and the
//! connectivity listener that keeps them in step. Built explicitly per session and torn
//! down with it; nothing here is process-global apart from the network observer handle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::fields::{FieldLogicEngine, FieldState};
use crate::forms::{
    ApplicationId, FileLocalStore, FormData, FormDataStore, LocalStore, MemoryLocalStore,
    SimulatedSyncTarget, StorageError, StoreNotice, SyncGate, SyncStatus, SyncTarget,
    UpdateOutcome,
};
use crate::network::{NetworkStatus, NetworkStatusObserver};
use crate::tasks::{
    BackgroundTaskMonitor, BackgroundTaskView, SimulatedTaskBackend, TaskBackend, TaskBoard,
    TaskMonitorError,
};
use crate::workflow::{
    NavigationError, Role, Stage, Transition, WorkflowCatalogue, WorkflowPosition,
    WorkflowProgress, WorkflowStateMachine,
};

/// Collaborators shared by every session a process opens.
#[derive(Clone)]
pub struct SessionDependencies {
    pub catalogue: Arc<WorkflowCatalogue>,
    pub local: Arc<dyn LocalStore>,
    pub remote: Arc<dyn SyncTarget>,
    pub backend: Arc<dyn TaskBackend>,
    pub network: NetworkStatusObserver,
    pub fields: Arc<FieldLogicEngine>,
    pub poll_interval: Duration,
    /// Serializes sync rounds per application id across reopened sessions.
    pub sync_gate: SyncGate,
}

impl SessionDependencies {
    /// Standard catalogue wired to the simulated remote and task backend.
    pub fn simulated(config: &EngineConfig, network: NetworkStatusObserver) -> Self {
        let local: Arc<dyn LocalStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileLocalStore::new(dir)),
            None => Arc::new(MemoryLocalStore::default()),
        };

        Self {
            catalogue: Arc::new(WorkflowCatalogue::standard()),
            local,
            remote: Arc::new(SimulatedSyncTarget::new(config.sync_latency)),
            backend: Arc::new(SimulatedTaskBackend::new(config.simulation_seed)),
            network,
            fields: Arc::new(FieldLogicEngine::default()),
            poll_interval: config.task_poll_interval,
            sync_gate: SyncGate::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Task(#[from] TaskMonitorError),
    #[error("no background task named `{0}`")]
    UnknownTask(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Set when the edit caused the workflow to skip past the current sub-stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSubStage {
    pub id: &'static str,
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<&'static str>,
}

/// Read model handed to rendering collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub application_id: ApplicationId,
    pub role: Role,
    pub position: WorkflowPosition,
    pub sub_stage: CurrentSubStage,
    pub progress: WorkflowProgress,
    pub form_data: FormData,
    pub sync_status: SyncStatus,
    pub has_pending_changes: bool,
    pub fields: BTreeMap<String, FieldState>,
    pub tasks: Vec<BackgroundTaskView>,
    pub network: NetworkStatus,
}

pub struct ApplicationSession {
    application_id: ApplicationId,
    role: Role,
    store: FormDataStore,
    workflow: Mutex<WorkflowStateMachine>,
    monitors: Arc<BTreeMap<&'static str, BackgroundTaskMonitor>>,
    board: TaskBoard,
    fields: Arc<FieldLogicEngine>,
    network: NetworkStatusObserver,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ApplicationSession {
    /// Opens the session, resuming any form data already held in local storage.
    /// Must be called inside a Tokio runtime.
    pub fn open(
        application_id: ApplicationId,
        role: Role,
        deps: &SessionDependencies,
    ) -> Result<Self, SessionError> {
        let store = FormDataStore::open(
            application_id.clone(),
            Arc::clone(&deps.local),
            Arc::clone(&deps.remote),
            deps.network.clone(),
            &deps.sync_gate,
        )?;

        let board = TaskBoard::default();
        let monitors: BTreeMap<&'static str, BackgroundTaskMonitor> = deps
            .catalogue
            .task_names()
            .into_iter()
            .map(|name| {
                let monitor = BackgroundTaskMonitor::new(
                    name,
                    application_id.clone(),
                    Arc::clone(&deps.backend),
                    deps.network.clone(),
                    board.clone(),
                    deps.poll_interval,
                );
                (name, monitor)
            })
            .collect();
        let monitors = Arc::new(monitors);

        let listener = spawn_connectivity_listener(
            &deps.network,
            store.clone(),
            Arc::clone(&monitors),
        );

        info!(application_id = %application_id, role = %role, "application session opened");

        Ok(Self {
            application_id,
            role,
            store,
            workflow: Mutex::new(WorkflowStateMachine::new(Arc::clone(&deps.catalogue))),
            monitors,
            board,
            fields: Arc::clone(&deps.fields),
            network: deps.network.clone(),
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn form_data(&self) -> FormData {
        self.store.get()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.store.sync_status()
    }

    pub fn position(&self) -> WorkflowPosition {
        self.workflow().position()
    }

    pub fn update_field(
        &self,
        field: impl Into<String>,
        value: Value,
    ) -> Result<FieldUpdate, SessionError> {
        let UpdateOutcome { status, notice } = self.store.update_field(field, value)?;

        let data = self.store.get();
        let settled = self.workflow().settle(&data, self.role);
        let transition = match settled {
            Ok(transition) => transition,
            Err(err) => {
                debug!(
                    application_id = %self.application_id,
                    error = %err,
                    "sub-stage no longer applies but cannot be skipped yet"
                );
                None
            }
        };
        // Re-entering the current sub-stage lets a consent edit start its task.
        let position = transition.as_ref().map_or_else(|| self.position(), |t| t.to);
        self.enter(position, &data);

        Ok(FieldUpdate {
            status,
            notice: notice.map(|notice| StoreNotice::message(notice).to_string()),
            transition,
        })
    }

    pub fn next(&self) -> Result<Transition, SessionError> {
        let data = self.store.get();
        let transition = self.workflow().next(&data, self.role).map_err(|err| {
            info!(
                application_id = %self.application_id,
                error = %err,
                "advance refused"
            );
            err
        })?;
        self.enter(transition.to, &data);
        Ok(transition)
    }

    pub fn prev(&self) -> Transition {
        let data = self.store.get();
        let transition = self.workflow().prev(&data);
        self.enter(transition.to, &data);
        transition
    }

    pub fn go_to(&self, stage: Stage, sub_stage: &str) -> Result<Transition, SessionError> {
        let data = self.store.get();
        let transition = self
            .workflow()
            .go_to(stage, sub_stage, &data, self.role)?;
        self.enter(transition.to, &data);
        Ok(transition)
    }

    /// Manual start or retry of a named task.
    pub fn start_task(&self, name: &str) -> Result<BackgroundTaskView, SessionError> {
        let monitor = self
            .monitors
            .get(name)
            .ok_or_else(|| SessionError::UnknownTask(name.to_string()))?;
        monitor.start()?;

        monitor
            .task()
            .map(|task| task.to_view())
            .ok_or_else(|| SessionError::UnknownTask(name.to_string()))
    }

    pub fn task(&self, name: &str) -> Option<BackgroundTaskView> {
        self.board.get(name).map(|task| task.to_view())
    }

    /// Field states for the current sub-stage, resolved against the latest form data.
    pub fn field_states(&self) -> BTreeMap<String, FieldState> {
        let data = self.store.get();
        let workflow = self.workflow();
        self.fields.resolve_all(&workflow.current().fields, &data)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.store.get();
        let workflow = self.workflow();
        let current = workflow.current();

        SessionSnapshot {
            application_id: self.application_id.clone(),
            role: self.role,
            position: workflow.position(),
            sub_stage: CurrentSubStage {
                id: current.id,
                title: current.title,
                requires_role: current.requires_role,
                access_notice: current
                    .requires_role
                    .filter(|required| *required != self.role)
                    .map(|required| format!("{} requires the {required} role", current.title)),
                task: current.task,
            },
            progress: workflow.progress(),
            fields: self.fields.resolve_all(&current.fields, &data),
            form_data: data,
            sync_status: self.store.sync_status(),
            has_pending_changes: self.store.has_pending_changes(),
            tasks: self.board.views(),
            network: self.network.status(),
        }
    }

    /// Stops the connectivity listener and every task loop. Idempotent.
    pub fn close(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .expect("session listener mutex poisoned")
            .take()
        {
            listener.abort();
            for monitor in self.monitors.values() {
                monitor.shutdown();
            }
            info!(application_id = %self.application_id, "application session closed");
        }
    }

    fn workflow(&self) -> MutexGuard<'_, WorkflowStateMachine> {
        self.workflow.lock().expect("workflow mutex poisoned")
    }

    fn enter(&self, position: WorkflowPosition, data: &FormData) {
        let task = self
            .workflow()
            .catalogue()
            .sub_stage(position)
            .and_then(|sub_stage| sub_stage.startable_task(data));

        if let Some(monitor) = task.and_then(|name| self.monitors.get(name)) {
            if monitor.ensure_started() {
                debug!(
                    application_id = %self.application_id,
                    task = monitor.name(),
                    position = %position,
                    "task started on sub-stage entry"
                );
            }
        }
    }
}

impl Drop for ApplicationSession {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
        for monitor in self.monitors.values() {
            monitor.shutdown();
        }
    }
}

fn spawn_connectivity_listener(
    network: &NetworkStatusObserver,
    store: FormDataStore,
    monitors: Arc<BTreeMap<&'static str, BackgroundTaskMonitor>>,
) -> JoinHandle<()> {
    let mut edges = network.subscribe();
    let network = network.clone();

    tokio::spawn(async move {
        loop {
            let online = match edges.recv().await {
                Ok(status) => status.is_online,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "connectivity listener lagged; using current status");
                    network.is_online()
                }
                Err(RecvError::Closed) => return,
            };

            store.handle_connectivity(online);
            for monitor in monitors.values() {
                monitor.handle_connectivity(online);
            }
        }
    })
}
