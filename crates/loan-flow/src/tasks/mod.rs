//! Background verification and decision tasks polled until they settle.

pub mod backend;
pub mod domain;
pub mod monitor;

pub use backend::{
    PollOutcome, ScriptedTaskBackend, SimulatedTaskBackend, TaskBackend, TaskBackendError,
};
pub use domain::{
    AutoOfferDecision, BackgroundTask, BackgroundTaskView, CreditBureauReport,
    DocumentVerificationReport, TaskState, TaskStatus, AUTO_OFFER, CREDIT_BUREAU_CHECK,
    DOCUMENT_VERIFICATION,
};
pub use monitor::{BackgroundTaskMonitor, TaskBoard, TaskMonitorError};
