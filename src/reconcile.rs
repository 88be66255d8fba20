//! Classification of persisted task records against the pending set.
//!
//! Each [`TaskRecord`] loaded from the store ends in exactly one place:
//!
//! | Pending entry with same name | `agentId` set | Result                          |
//! |------------------------------|---------------|---------------------------------|
//! | one                          | yes           | launched + reconcile, unpended  |
//! | one                          | no            | stale: node deleted             |
//! | none                         | either        | kill                            |
//! | several                      | either        | [`RecoveryError::DuplicatePending`] |
//!
//! [`classify`] is the pure decision. [`Reconciler::apply`] carries it out
//! against a [`SchedulerState`] the caller holds exclusively.

use crate::config::StalePendingPolicy;
use crate::domain::{PendingTask, TaskRecord};
use crate::error::RecoveryError;
use crate::state::SchedulerState;

/// Outcome of [`classify`], pointing at the matched pending entry when there
/// is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Matched and dispatched: resume as launched.
    Resume {
        /// Index of the matched entry in the pending slice.
        pending_index: usize,
    },
    /// Matched but never dispatched: delete the record.
    Stale {
        /// Index of the matched entry in the pending slice.
        pending_index: usize,
    },
    /// Nothing pending wants this task.
    Kill,
}

/// Decides what to do with `record` given the current pending set.
///
/// Matching is on `name` only.
///
/// # Errors
///
/// [`RecoveryError::DuplicatePending`] if more than one pending entry has
/// the record's name.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::{classify, Classification, PendingTask, TaskRecord};
///
/// let pending = vec![PendingTask::new("a"), PendingTask::new("w1")];
/// let record = TaskRecord::with_id("t1", "w1").with_agent("agent-1");
/// assert_eq!(
///     classify(&record, &pending).unwrap(),
///     Classification::Resume { pending_index: 1 }
/// );
/// assert_eq!(
///     classify(&TaskRecord::with_id("t2", "orphan"), &pending).unwrap(),
///     Classification::Kill
/// );
/// ```
pub fn classify(
    record: &TaskRecord,
    pending: &[PendingTask],
) -> Result<Classification, RecoveryError> {
    let mut matches = pending
        .iter()
        .enumerate()
        .filter(|(_, task)| task.name == record.name)
        .map(|(index, _)| index);

    let Some(pending_index) = matches.next() else {
        return Ok(Classification::Kill);
    };

    let others = matches.count();
    if others > 0 {
        return Err(RecoveryError::DuplicatePending {
            name: record.name.clone(),
            count: others + 1,
        });
    }

    if record.is_dispatched() {
        Ok(Classification::Resume { pending_index })
    } else {
        Ok(Classification::Stale { pending_index })
    }
}

/// What [`Reconciler::apply`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Added to launched and to-reconcile; its pending entry was removed.
    Launched,
    /// Never dispatched; the caller must delete its node.
    Stale,
    /// Added to to-kill.
    Kill,
    /// Already launched or marked for killing by an earlier load; nothing
    /// changed.
    AlreadyTracked,
}

/// Applies classifications to scheduler state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: StalePendingPolicy,
}

impl Reconciler {
    /// Creates a reconciler with the given stale pending policy.
    pub fn new(policy: StalePendingPolicy) -> Self {
        Self { policy }
    }

    /// The stale pending policy in effect.
    pub fn policy(&self) -> StalePendingPolicy {
        self.policy
    }

    /// Classifies `record` against `state.pending()` and performs the
    /// matching mutation.
    ///
    /// At most one pending entry is removed and `record` is added to at
    /// most one of launched or to-kill. On error nothing is mutated.
    pub fn apply(
        &self,
        record: TaskRecord,
        state: &mut SchedulerState,
    ) -> Result<Disposition, RecoveryError> {
        if state.is_tracked(&record.task_id) {
            tracing::debug!(task_id = %record.task_id, "task already tracked, skipping");
            return Ok(Disposition::AlreadyTracked);
        }

        match classify(&record, &state.pending)? {
            Classification::Resume { pending_index } => {
                state.pending.remove(pending_index);
                tracing::debug!(
                    task_id = %record.task_id,
                    name = %record.name,
                    "resuming launched task"
                );
                state.to_reconcile.push(record.clone());
                state.launched.push(record);
                Ok(Disposition::Launched)
            }
            Classification::Stale { pending_index } => {
                if self.policy == StalePendingPolicy::Remove {
                    state.pending.remove(pending_index);
                }
                Ok(Disposition::Stale)
            }
            Classification::Kill => {
                tracing::info!(
                    task_id = %record.task_id,
                    name = %record.name,
                    "setting task to be killed"
                );
                state.to_kill.push(record);
                Ok(Disposition::Kill)
            }
        }
    }
}
