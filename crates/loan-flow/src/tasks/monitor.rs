use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{PollOutcome, TaskBackend};
use super::domain::{
    completed_message, processing_message, started_message, BackgroundTask, BackgroundTaskView,
    TaskState, TaskStatus, INTERRUPTED_MESSAGE, OFFLINE_START_MESSAGE,
};
use crate::forms::ApplicationId;
use crate::network::NetworkStatusObserver;

/// Per-application map of task entries. Monitors write into it; everything else reads.
#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    entries: Arc<Mutex<BTreeMap<String, BackgroundTask>>>,
}

impl TaskBoard {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BackgroundTask>> {
        self.entries.lock().expect("task board mutex poisoned")
    }

    pub fn get(&self, name: &str) -> Option<BackgroundTask> {
        self.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn status(&self, name: &str) -> TaskStatus {
        self.lock()
            .get(name)
            .map_or(TaskStatus::Idle, BackgroundTask::status)
    }

    pub fn views(&self) -> Vec<BackgroundTaskView> {
        self.lock().values().map(BackgroundTask::to_view).collect()
    }

    fn put(&self, task: BackgroundTask) {
        self.lock().insert(task.name.clone(), task);
    }

    fn modify(&self, name: &str, apply: impl FnOnce(&mut BackgroundTask)) {
        if let Some(task) = self.lock().get_mut(name) {
            apply(task);
        }
    }

    fn fail(&self, name: &str, reason: &str) {
        let now = Utc::now();
        let mut entries = self.lock();
        let task = entries.entry(name.to_string()).or_insert_with(|| BackgroundTask {
            name: name.to_string(),
            state: TaskState::Idle,
            message: None,
            created_at: now,
            completed_at: None,
        });
        task.fail(reason.to_string(), now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskMonitorError {
    #[error("cannot start {task} while offline")]
    Offline { task: String },
}

/// Drives the poll loop for one named task of one application. At most one loop is
/// alive per monitor; dropping the monitor cancels it.
pub struct BackgroundTaskMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    name: String,
    application_id: ApplicationId,
    backend: Arc<dyn TaskBackend>,
    network: NetworkStatusObserver,
    board: TaskBoard,
    poll_interval: Duration,
    control: Mutex<PollControl>,
}

#[derive(Default)]
struct PollControl {
    /// Bumped whenever a loop is started or cancelled; ticks from older runs are dropped.
    run: u64,
    handle: Option<JoinHandle<()>>,
    attempts: u32,
}

impl PollControl {
    fn cancel(&mut self) -> bool {
        self.run += 1;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl BackgroundTaskMonitor {
    pub fn new(
        name: impl Into<String>,
        application_id: ApplicationId,
        backend: Arc<dyn TaskBackend>,
        network: NetworkStatusObserver,
        board: TaskBoard,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                name: name.into(),
                application_id,
                backend,
                network,
                board,
                poll_interval,
                control: Mutex::new(PollControl::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Starts or restarts the task. Offline starts are recorded on the board as an error
    /// entry and reported back without polling.
    pub fn start(&self) -> Result<(), TaskMonitorError> {
        let mut control = self.inner.lock_control();
        self.inner.start_locked(&mut control)
    }

    /// Starts the task only when it has never run and the network is up. Used when the
    /// user enters the sub-stage the task belongs to.
    pub fn ensure_started(&self) -> bool {
        let mut control = self.inner.lock_control();
        if self.inner.board.contains(&self.inner.name) || !self.inner.network.is_online() {
            return false;
        }
        self.inner.start_locked(&mut control).is_ok()
    }

    /// Reacts to a connectivity edge. Going offline interrupts an active loop; coming back
    /// online resumes an errored task once. Returns whether anything changed.
    pub fn handle_connectivity(&self, online: bool) -> bool {
        let mut control = self.inner.lock_control();
        let name = self.inner.name.as_str();

        if !online {
            if control.handle.is_none() {
                return false;
            }
            control.cancel();
            self.inner.board.fail(name, INTERRUPTED_MESSAGE);
            warn!(
                application_id = %self.inner.application_id,
                task = name,
                "task interrupted by connectivity loss"
            );
            return true;
        }

        let errored = self.inner.board.status(name) == TaskStatus::Error;
        if !errored || control.handle.is_some() {
            return false;
        }

        info!(
            application_id = %self.inner.application_id,
            task = name,
            "resuming errored task after reconnect"
        );
        self.inner.start_locked(&mut control).is_ok()
    }

    /// Cancels any active loop without touching the board entry.
    pub fn shutdown(&self) {
        if self.inner.lock_control().cancel() {
            debug!(
                application_id = %self.inner.application_id,
                task = %self.inner.name,
                "task polling stopped"
            );
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.lock_control().handle.is_some()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.board.status(&self.inner.name)
    }

    pub fn task(&self) -> Option<BackgroundTask> {
        self.inner.board.get(&self.inner.name)
    }

    /// Number of start requests, manual or automatic, including refused ones.
    pub fn attempts(&self) -> u32 {
        self.inner.lock_control().attempts
    }
}

impl Drop for BackgroundTaskMonitor {
    fn drop(&mut self) {
        if let Ok(mut control) = self.inner.control.lock() {
            control.cancel();
        }
    }
}

impl MonitorInner {
    fn lock_control(&self) -> MutexGuard<'_, PollControl> {
        self.control.lock().expect("task monitor mutex poisoned")
    }

    fn start_locked(self: &Arc<Self>, control: &mut PollControl) -> Result<(), TaskMonitorError> {
        control.attempts += 1;

        if !self.network.is_online() {
            control.cancel();
            self.board.fail(&self.name, OFFLINE_START_MESSAGE);
            warn!(
                application_id = %self.application_id,
                task = %self.name,
                "task start refused while offline"
            );
            return Err(TaskMonitorError::Offline {
                task: self.name.clone(),
            });
        }

        control.cancel();
        let restart = self.board.contains(&self.name);
        self.board.put(BackgroundTask::pending(
            &self.name,
            started_message(restart),
            Utc::now(),
        ));

        let run = control.run;
        control.handle = Some(tokio::spawn(Arc::clone(self).poll(run)));
        info!(
            application_id = %self.application_id,
            task = %self.name,
            restart,
            attempt = control.attempts,
            "task polling started"
        );
        Ok(())
    }

    async fn poll(self: Arc<Self>, run: u64) {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let outcome = self.backend.poll(&self.application_id, &self.name).await;

            let mut control = self.lock_control();
            if control.run != run {
                debug!(task = %self.name, run, "dropping tick from cancelled run");
                return;
            }

            let now = Utc::now();
            match outcome {
                Ok(PollOutcome::Pending) => {
                    let message = processing_message(&self.name);
                    self.board.modify(&self.name, |task| task.progress(message));
                    debug!(
                        application_id = %self.application_id,
                        task = %self.name,
                        "task still pending"
                    );
                    continue;
                }
                Ok(PollOutcome::Succeeded(payload)) => {
                    let message = completed_message(&self.name);
                    self.board
                        .modify(&self.name, |task| task.succeed(payload, message, now));
                    info!(
                        application_id = %self.application_id,
                        task = %self.name,
                        "task succeeded"
                    );
                }
                Ok(PollOutcome::Failed(reason)) => {
                    warn!(
                        application_id = %self.application_id,
                        task = %self.name,
                        reason = %reason,
                        "task failed"
                    );
                    self.board.modify(&self.name, |task| task.fail(reason, now));
                }
                Err(err) => {
                    warn!(
                        application_id = %self.application_id,
                        task = %self.name,
                        error = %err,
                        "task status query failed"
                    );
                    let reason = err.to_string();
                    self.board.modify(&self.name, |task| task.fail(reason, now));
                }
            }

            // Terminal outcome: detach our own handle so the monitor reads as idle.
            control.handle = None;
            return;
        }
    }
}
