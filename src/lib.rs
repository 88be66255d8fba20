//! Crash recovery and state reconciliation for a cluster task scheduler.
//!
//! On restart a scheduler has no in-memory record of the tasks it launched.
//! The only durable record is a set of task documents kept in a hierarchical
//! coordination store (ZooKeeper-style: ordered child listing, node get/set,
//! recursive create and delete). This crate rebuilds the in-memory task set
//! from those documents and sorts every persisted task into one recovery
//! action:
//!
//! - **launched** (and reconcile-needed): the task matches a pending task by
//!   name and was dispatched to an agent,
//! - **stale**: the task matches a pending task but never reached an agent,
//!   so its node is deleted,
//! - **kill**: nothing pending wants the task any more.
//!
//! # Module Organization
//!
//! - [`store`] - The [`CoordinationStore`](store::CoordinationStore) seam,
//!   path helpers and an in-memory backend
//! - [`domain`] - [`TaskRecord`] and [`PendingTask`] document types
//! - [`state`] - Scheduler collections behind a single lock
//! - [`reconcile`] - The classification algorithm
//! - [`repository`] - `save`, `delete` and `load_all` over a store
//! - [`config`] - TOML and environment driven configuration
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use scheduler_recovery::store::memory::InMemoryStore;
//! use scheduler_recovery::{PendingTask, RecoveryConfig, SharedSchedulerState, TaskRecord, TaskRepository};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let repo = TaskRepository::new(InMemoryStore::new(), RecoveryConfig::default()).unwrap();
//! repo.save(&TaskRecord::new("web-1").with_agent("agent-7")).await.unwrap();
//!
//! let state = SharedSchedulerState::with_pending([PendingTask::new("web-1")]);
//! let report = repo.load_all(&state).await.unwrap();
//! assert_eq!(report.launched.len(), 1);
//! assert!(state.pending().is_empty());
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod reconcile;
pub mod repository;
pub mod state;
pub mod store;

// Re-exports for ergonomic access
pub use config::{ConfigError, RecoveryConfig, StalePendingPolicy};
pub use domain::{PendingTask, RuntimeInfo, TaskRecord};
pub use error::RecoveryError;
pub use reconcile::{classify, Classification, Disposition, Reconciler};
pub use repository::{LoadReport, SaveReport, TaskRepository};
pub use state::{SchedulerState, SharedSchedulerState};
