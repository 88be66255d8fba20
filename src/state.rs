//! Scheduler collections touched by recovery.
//!
//! [`SchedulerState`] owns the four disjoint collections: pending, launched,
//! to-kill and to-reconcile. [`SharedSchedulerState`] is the handle every
//! concurrent load completion goes through. It wraps the state in a single
//! `parking_lot::Mutex` so that reading the pending set, choosing a
//! disposition and mutating the collections happen in one critical section.
//!
//! The lock is never held across an `.await`; store I/O decided by a
//! classification runs after the guard is dropped.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{PendingTask, TaskRecord};
use crate::error::RecoveryError;
use crate::reconcile::{Disposition, Reconciler};

/// The scheduler's view of tasks during and after recovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub(crate) pending: Vec<PendingTask>,
    pub(crate) launched: Vec<TaskRecord>,
    pub(crate) to_kill: Vec<TaskRecord>,
    pub(crate) to_reconcile: Vec<TaskRecord>,
}

impl SchedulerState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state whose pending set holds `pending`.
    pub fn with_pending(pending: impl IntoIterator<Item = PendingTask>) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Tasks the scheduler still wants satisfied.
    pub fn pending(&self) -> &[PendingTask] {
        &self.pending
    }

    /// Tasks confirmed dispatched and resumed from the store.
    pub fn launched(&self) -> &[TaskRecord] {
        &self.launched
    }

    /// Tasks the orchestrator must be asked to terminate.
    pub fn to_kill(&self) -> &[TaskRecord] {
        &self.to_kill
    }

    /// Tasks whose live status the orchestrator must confirm.
    pub fn to_reconcile(&self) -> &[TaskRecord] {
        &self.to_reconcile
    }

    /// Adds a task to the pending set.
    pub fn push_pending(&mut self, task: PendingTask) {
        self.pending.push(task);
    }

    /// `true` if a record with `task_id` is already launched or marked for
    /// killing.
    pub fn is_tracked(&self, task_id: &str) -> bool {
        self.launched
            .iter()
            .chain(&self.to_kill)
            .any(|record| record.task_id == task_id)
    }

    /// Drains the to-kill collection.
    pub fn take_to_kill(&mut self) -> Vec<TaskRecord> {
        std::mem::take(&mut self.to_kill)
    }

    /// Drains the to-reconcile collection.
    pub fn take_to_reconcile(&mut self) -> Vec<TaskRecord> {
        std::mem::take(&mut self.to_reconcile)
    }
}

/// Cloneable, thread-safe handle to a [`SchedulerState`].
///
/// Clones share the same state.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::{PendingTask, SharedSchedulerState};
///
/// let state = SharedSchedulerState::with_pending([PendingTask::new("web")]);
/// let handle = state.clone();
/// handle.push_pending(PendingTask::new("db"));
/// assert_eq!(state.pending().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedSchedulerState {
    inner: Arc<Mutex<SchedulerState>>,
}

impl SharedSchedulerState {
    /// Creates a handle over an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle whose pending set holds `pending`.
    pub fn with_pending(pending: impl IntoIterator<Item = PendingTask>) -> Self {
        Self::from(SchedulerState::with_pending(pending))
    }

    /// Classifies `record` and applies the result under one lock
    /// acquisition.
    pub fn reconcile(
        &self,
        reconciler: &Reconciler,
        record: TaskRecord,
    ) -> Result<Disposition, RecoveryError> {
        let mut state = self.inner.lock();
        reconciler.apply(record, &mut state)
    }

    /// Runs `f` with exclusive access to the state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SchedulerState) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// A consistent copy of all four collections.
    pub fn snapshot(&self) -> SchedulerState {
        self.inner.lock().clone()
    }

    /// Copy of the pending set.
    pub fn pending(&self) -> Vec<PendingTask> {
        self.inner.lock().pending.clone()
    }

    /// Copy of the launched set.
    pub fn launched(&self) -> Vec<TaskRecord> {
        self.inner.lock().launched.clone()
    }

    /// Copy of the to-kill set.
    pub fn to_kill(&self) -> Vec<TaskRecord> {
        self.inner.lock().to_kill.clone()
    }

    /// Copy of the to-reconcile set.
    pub fn to_reconcile(&self) -> Vec<TaskRecord> {
        self.inner.lock().to_reconcile.clone()
    }

    /// Adds a task to the pending set.
    pub fn push_pending(&self, task: PendingTask) {
        self.inner.lock().push_pending(task);
    }

    /// Drains the to-kill collection.
    pub fn take_to_kill(&self) -> Vec<TaskRecord> {
        self.inner.lock().take_to_kill()
    }

    /// Drains the to-reconcile collection.
    pub fn take_to_reconcile(&self) -> Vec<TaskRecord> {
        self.inner.lock().take_to_reconcile()
    }
}

impl From<SchedulerState> for SharedSchedulerState {
    fn from(state: SchedulerState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }
}
