//! Workflow and form engine for multi-stage loan applications.
//!
//! The pieces compose bottom-up: [`fields`] evaluates declarative field rules,
//! [`forms`] keeps an offline-first copy of the form, [`workflow`] owns stage
//! navigation, [`tasks`] polls background verifications, and [`session`] wires
//! them together for one application.

pub mod config;
pub mod error;
pub mod fields;
pub mod forms;
pub mod network;
pub mod session;
pub mod tasks;
pub mod telemetry;
pub mod workflow;

pub use network::{NetworkStatus, NetworkStatusObserver};
pub use session::{
    ApplicationSession, FieldUpdate, SessionDependencies, SessionError, SessionSnapshot,
};
