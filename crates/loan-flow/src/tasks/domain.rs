use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CREDIT_BUREAU_CHECK: &str = "creditBureauCheck";
pub const DOCUMENT_VERIFICATION: &str = "documentVerification";
pub const AUTO_OFFER: &str = "autoOffer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl TaskStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Error => "Error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Idle,
    Pending,
    Succeeded(Value),
    Failed(String),
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Idle => TaskStatus::Idle,
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Succeeded(_) => TaskStatus::Success,
            TaskState::Failed(_) => TaskStatus::Error,
        }
    }
}

/// Current entry for one named task. A restart replaces the entry; earlier runs are not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTask {
    pub name: String,
    pub state: TaskState,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackgroundTask {
    pub(crate) fn pending(name: &str, message: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            state: TaskState::Pending,
            message: Some(message.to_string()),
            created_at: now,
            completed_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            TaskState::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    pub(crate) fn progress(&mut self, message: String) {
        self.state = TaskState::Pending;
        self.message = Some(message);
    }

    pub(crate) fn succeed(&mut self, payload: Value, message: String, now: DateTime<Utc>) {
        self.state = TaskState::Succeeded(payload);
        self.message = Some(message);
        self.completed_at = Some(now);
    }

    pub(crate) fn fail(&mut self, reason: String, now: DateTime<Utc>) {
        self.message = Some(reason.clone());
        self.state = TaskState::Failed(reason);
        self.completed_at = Some(now);
    }

    pub fn to_view(&self) -> BackgroundTaskView {
        BackgroundTaskView {
            name: self.name.clone(),
            status: self.status(),
            status_label: self.status().label().to_string(),
            message: self.message.clone(),
            result: self.result().cloned(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Serialized shape read by rendering collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTaskView {
    pub name: String,
    pub status: TaskStatus,
    pub status_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBureauReport {
    pub score: u32,
    pub status: String,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVerificationReport {
    pub verified: bool,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoOfferDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

pub(crate) fn started_message(restart: bool) -> &'static str {
    if restart {
        "Task restarted"
    } else {
        "Task started"
    }
}

pub(crate) fn processing_message(name: &str) -> String {
    format!("Processing {name}...")
}

pub(crate) fn completed_message(name: &str) -> String {
    format!("{name} completed successfully")
}

pub(crate) fn failed_message(name: &str) -> String {
    format!("Error processing {name}")
}

pub(crate) const OFFLINE_START_MESSAGE: &str = "Cannot start task while offline";
pub(crate) const INTERRUPTED_MESSAGE: &str = "Task interrupted - you are offline";
