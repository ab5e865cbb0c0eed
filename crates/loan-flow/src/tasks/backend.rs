use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::domain::{
    failed_message, AutoOfferDecision, CreditBureauReport, DocumentVerificationReport, AUTO_OFFER,
    CREDIT_BUREAU_CHECK, DOCUMENT_VERIFICATION,
};
use crate::forms::ApplicationId;

/// What the remote reports for one status query.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending,
    Succeeded(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskBackendError {
    #[error("task service unreachable: {0}")]
    Unreachable(String),
    #[error("task service returned an unreadable payload for {task}: {reason}")]
    Payload { task: String, reason: String },
}

/// Status endpoint for long-running verification and decision processes.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn poll(
        &self,
        application_id: &ApplicationId,
        task: &str,
    ) -> Result<PollOutcome, TaskBackendError>;
}

const CONTINUE_BELOW: f64 = 0.7;
const SUCCEED_BELOW: f64 = 0.95;

/// Stand-in backend drawing one outcome per poll: mostly still running, usually
/// succeeding after that, occasionally failing.
#[derive(Debug)]
pub struct SimulatedTaskBackend {
    rng: Mutex<StdRng>,
}

impl SimulatedTaskBackend {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> f64 {
        self.rng
            .lock()
            .expect("task backend rng mutex poisoned")
            .gen::<f64>()
    }
}

impl Default for SimulatedTaskBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl TaskBackend for SimulatedTaskBackend {
    async fn poll(
        &self,
        _application_id: &ApplicationId,
        task: &str,
    ) -> Result<PollOutcome, TaskBackendError> {
        let draw = self.draw();
        if draw < CONTINUE_BELOW {
            return Ok(PollOutcome::Pending);
        }
        if draw < SUCCEED_BELOW {
            return simulated_payload(task).map(PollOutcome::Succeeded);
        }
        Ok(PollOutcome::Failed(failed_message(task)))
    }
}

fn simulated_payload(task: &str) -> Result<Value, TaskBackendError> {
    let encoded = match task {
        CREDIT_BUREAU_CHECK => serde_json::to_value(CreditBureauReport {
            score: 720,
            status: "APPROVED".into(),
            factors: vec!["Payment History".into(), "Credit Utilization".into()],
        }),
        DOCUMENT_VERIFICATION => serde_json::to_value(DocumentVerificationReport {
            verified: true,
            documents: vec![
                "id_proof".into(),
                "address_proof".into(),
                "income_proof".into(),
            ],
        }),
        AUTO_OFFER => serde_json::to_value(AutoOfferDecision {
            approved: true,
            amount: Some(35_000),
            rate: Some("7.5%".into()),
            term: Some("60 months".into()),
        }),
        _ => {
            return Err(TaskBackendError::Payload {
                task: task.to_string(),
                reason: "no payload contract for this task".into(),
            })
        }
    };

    encoded.map_err(|err| TaskBackendError::Payload {
        task: task.to_string(),
        reason: err.to_string(),
    })
}

/// Backend replaying a fixed sequence of outcomes, then reporting pending forever.
#[derive(Debug, Default)]
pub struct ScriptedTaskBackend {
    script: Mutex<VecDeque<Result<PollOutcome, TaskBackendError>>>,
    polls: AtomicUsize,
}

impl ScriptedTaskBackend {
    pub fn new(outcomes: impl IntoIterator<Item = PollOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().map(Ok).collect()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, outcome: Result<PollOutcome, TaskBackendError>) {
        self.script
            .lock()
            .expect("scripted backend mutex poisoned")
            .push_back(outcome);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBackend for ScriptedTaskBackend {
    async fn poll(
        &self,
        _application_id: &ApplicationId,
        _task: &str,
    ) -> Result<PollOutcome, TaskBackendError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("scripted backend mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(PollOutcome::Pending))
    }
}
