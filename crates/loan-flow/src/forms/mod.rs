//! Offline-first form data: local snapshots, remote reconciliation and sync status.

pub mod data;
pub mod local;
pub mod remote;
pub mod store;

pub use data::{ApplicationId, FormData};
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore, StorageError};
pub use remote::{SimulatedSyncTarget, SyncError, SyncTarget};
pub use store::{FormDataStore, StoreNotice, SyncGate, SyncStatus, UpdateOutcome};
