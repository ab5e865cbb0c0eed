use loan_flow::error::AppError;
use loan_flow::forms::ApplicationId;
use loan_flow::workflow::Role;
use loan_flow::{ApplicationSession, NetworkStatusObserver, SessionDependencies};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Open application sessions keyed by application id. At most one session per id.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    deps: SessionDependencies,
    sessions: Arc<Mutex<HashMap<ApplicationId, Arc<ApplicationSession>>>>,
}

impl SessionRegistry {
    pub(crate) fn new(deps: SessionDependencies) -> Self {
        Self {
            deps,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn network(&self) -> &NetworkStatusObserver {
        &self.deps.network
    }

    /// Opens a session, closing any previous one for the same application first so
    /// two sessions never drive the same form.
    pub(crate) fn open(
        &self,
        application_id: ApplicationId,
        role: Role,
    ) -> Result<Arc<ApplicationSession>, AppError> {
        let mut guard = self.sessions.lock().expect("session registry mutex poisoned");
        if let Some(previous) = guard.remove(&application_id) {
            previous.close();
            info!(application_id = %application_id, "replacing open session");
        }

        let session = Arc::new(ApplicationSession::open(
            application_id.clone(),
            role,
            &self.deps,
        )?);
        guard.insert(application_id, Arc::clone(&session));
        Ok(session)
    }

    pub(crate) fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Arc<ApplicationSession>, AppError> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .get(application_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownApplication(application_id.to_string()))
    }

    pub(crate) fn close(&self, application_id: &ApplicationId) -> Result<(), AppError> {
        let session = self
            .sessions
            .lock()
            .expect("session registry mutex poisoned")
            .remove(application_id)
            .ok_or_else(|| AppError::UnknownApplication(application_id.to_string()))?;
        session.close();
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use loan_flow::config::EngineConfig;
    use std::time::Duration;

    pub(crate) fn registry() -> SessionRegistry {
        let config = EngineConfig {
            sync_latency: Duration::from_millis(10),
            task_poll_interval: Duration::from_millis(50),
            storage_dir: None,
            simulation_seed: Some(7),
        };
        SessionRegistry::new(SessionDependencies::simulated(
            &config,
            NetworkStatusObserver::default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::registry;
    use super::*;

    #[tokio::test]
    async fn reopening_replaces_the_previous_session() {
        let registry = registry();
        let id = ApplicationId::from("app-1");

        let first = registry.open(id.clone(), Role::Agent).expect("open");
        let second = registry.open(id.clone(), Role::Manager).expect("reopen");

        assert_eq!(registry.len(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.get(&id).expect("lookup").role(), Role::Manager);
    }

    #[tokio::test]
    async fn closing_unknown_application_is_reported() {
        let registry = registry();
        let err = registry
            .close(&ApplicationId::from("missing"))
            .expect_err("nothing open");
        assert!(matches!(err, AppError::UnknownApplication(id) if id == "missing"));
    }
}
