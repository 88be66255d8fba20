//! Coordination store seam and backends.
//!
//! # Architecture
//!
//! 1. **[`CoordinationStore`]** -- Node-CRUD trait that store clients
//!    implement. No domain logic.
//!
//! 2. **[`TaskRepository`](crate::repository::TaskRepository)** -- Maps
//!    [`TaskRecord`](crate::domain::TaskRecord)s onto nodes and runs the
//!    recovery load. Generic over any `CoordinationStore`.
//!
//! # Backends
//!
//! - [`InMemoryStore`](memory::InMemoryStore) -- `DashMap`-backed node tree
//!   with failure injection, used by tests and local runs.

pub mod backend;
pub mod memory;

pub use backend::{task_path, tasks_path, CoordinationStore, StoreError, StoreOp};
