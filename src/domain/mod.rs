//! Domain types for task recovery.
//!
//! [`TaskRecord`] is the durable document kept in the coordination store.
//! [`PendingTask`] is the scheduler's in-memory description of a task it
//! still wants satisfied; records are matched against it by name.

pub mod record;

pub use record::*;
