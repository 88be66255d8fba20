//! Task persistence and recovery loading over a [`CoordinationStore`].
//!
//! [`TaskRepository`] maps [`TaskRecord`]s onto nodes at
//! `{service_path}/tasks/{task_id}` and runs the startup load that feeds
//! every persisted record through the [`Reconciler`].
//!
//! # Failure Handling
//!
//! Store failures on a single node are logged and recorded in the
//! [`LoadReport`]; they never abort the rest of the load and never cause a
//! node to be deleted. Only a node that reads back successfully with an
//! empty payload is treated as corrupt and pruned.
//!
//! Every store call is bounded by
//! [`RecoveryConfig::operation_timeout`]; an expired bound surfaces as
//! [`StoreError::Timeout`] and is handled like any other transient failure.

use std::future::Future;

use futures::StreamExt;

use crate::config::{ConfigError, RecoveryConfig};
use crate::domain::TaskRecord;
use crate::error::RecoveryError;
use crate::reconcile::{Disposition, Reconciler};
use crate::state::SharedSchedulerState;
use crate::store::backend::{task_path, tasks_path, CoordinationStore, StoreError, StoreOp};

/// Summary of one [`TaskRepository::load_all`] run.
///
/// Every listed child appears in exactly one of `launched`, `killed`,
/// `stale`, `corrupt`, `already_tracked` or `failed`. Entries are in
/// completion order.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of child nodes found under the tasks namespace.
    pub listed: usize,
    /// Task IDs resumed as launched (and queued for reconciliation).
    pub launched: Vec<String>,
    /// Task IDs queued for killing.
    pub killed: Vec<String>,
    /// Task IDs that were never dispatched; their nodes were deleted.
    pub stale: Vec<String>,
    /// Nodes that had no data; they were deleted.
    pub corrupt: Vec<String>,
    /// Task IDs an earlier load already placed in launched or to-kill.
    pub already_tracked: Vec<String>,
    /// Nodes that could not be read, decoded or classified.
    pub failed: Vec<RecoveryError>,
    /// Deletions of stale or corrupt nodes that did not go through. The
    /// node may still exist.
    pub cleanup_failed: Vec<RecoveryError>,
}

impl LoadReport {
    /// Number of children that reached a final outcome, failures included.
    pub fn settled(&self) -> usize {
        self.launched.len()
            + self.killed.len()
            + self.stale.len()
            + self.corrupt.len()
            + self.already_tracked.len()
            + self.failed.len()
    }

    /// `true` if nothing failed, cleanups included.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cleanup_failed.is_empty()
    }

    fn record(&mut self, outcome: ChildOutcome) {
        match outcome {
            ChildOutcome::Classified {
                task_id,
                disposition,
                cleanup,
            } => {
                match disposition {
                    Disposition::Launched => self.launched.push(task_id),
                    Disposition::Kill => self.killed.push(task_id),
                    Disposition::Stale => self.stale.push(task_id),
                    Disposition::AlreadyTracked => self.already_tracked.push(task_id),
                }
                self.cleanup_failed.extend(cleanup);
            }
            ChildOutcome::Corrupt { node, cleanup } => {
                self.corrupt.push(node);
                self.cleanup_failed.extend(cleanup);
            }
            ChildOutcome::Failed(err) => self.failed.push(err),
        }
    }
}

/// Result of [`TaskRepository::save_all`].
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Task IDs written successfully.
    pub saved: Vec<String>,
    /// Saves that failed, one error per task.
    pub failed: Vec<RecoveryError>,
}

enum ChildOutcome {
    Classified {
        task_id: String,
        disposition: Disposition,
        cleanup: Option<RecoveryError>,
    },
    Corrupt {
        node: String,
        cleanup: Option<RecoveryError>,
    },
    Failed(RecoveryError),
}

/// Durable task bookkeeping on top of a [`CoordinationStore`].
///
/// # Type Parameters
///
/// * `S` - A [`CoordinationStore`] implementation (in-memory, ZooKeeper
///   client, ...)
#[derive(Debug)]
pub struct TaskRepository<S: CoordinationStore> {
    store: S,
    config: RecoveryConfig,
    reconciler: Reconciler,
}

impl<S: CoordinationStore> TaskRepository<S> {
    /// Creates a repository over `store`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `config` fails
    /// [`RecoveryConfig::validate`].
    pub fn new(store: S, config: RecoveryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let reconciler = Reconciler::new(config.stale_pending);
        Ok(Self {
            store,
            config,
            reconciler,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configuration in effect.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Namespace node holding one child per task.
    pub fn tasks_path(&self) -> String {
        tasks_path(&self.config.service_path)
    }

    /// Node path for `task_id`.
    pub fn task_path(&self, task_id: &str) -> String {
        task_path(&self.config.service_path, task_id)
    }

    async fn bounded<T, F>(&self, op: StoreOp, path: &str, call: F) -> Result<T, RecoveryError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout_ms = self.config.operation_timeout_ms;
        match tokio::time::timeout(self.config.operation_timeout(), call).await {
            Ok(result) => result.map_err(|e| RecoveryError::store(op, path, e)),
            Err(_) => Err(RecoveryError::store(
                op,
                path,
                StoreError::Timeout {
                    op,
                    path: path.to_string(),
                    timeout_ms,
                },
            )),
        }
    }

    /// Persists `task`, creating its node if needed and overwriting any
    /// previous document.
    ///
    /// A `task_id` that is not a single node name is rejected with
    /// [`RecoveryError::InvalidTaskId`] before the store is touched.
    ///
    /// Node creation and the data write are two store calls. If creation
    /// fails the write is not attempted. If the write fails the node is left
    /// empty or stale, which a later [`load_all`](Self::load_all) detects.
    /// Failures are logged and returned; nothing is retried.
    pub async fn save(&self, task: &TaskRecord) -> Result<(), RecoveryError> {
        check_task_id(&task.task_id)?;
        let path = self.task_path(&task.task_id);
        let data = task.to_document()?;

        if let Err(err) = self
            .bounded(StoreOp::CreatePath, &path, self.store.create_path(&path))
            .await
        {
            tracing::error!(
                task_id = %task.task_id,
                name = %task.name,
                error = %err,
                "failed to create task node"
            );
            return Err(err);
        }

        if let Err(err) = self
            .bounded(StoreOp::WriteNode, &path, self.store.write_node(&path, &data))
            .await
        {
            tracing::error!(
                task_id = %task.task_id,
                name = %task.name,
                error = %err,
                "failed to save task data"
            );
            return Err(err);
        }

        tracing::debug!(task_id = %task.task_id, name = %task.name, "saved task");
        Ok(())
    }

    /// Persists every task in `tasks` concurrently.
    pub async fn save_all<'a, I>(&self, tasks: I) -> SaveReport
    where
        I: IntoIterator<Item = &'a TaskRecord>,
    {
        let saves = tasks
            .into_iter()
            .map(|task| async move { (task.task_id.clone(), self.save(task).await) });

        let mut report = SaveReport::default();
        for (task_id, result) in futures::future::join_all(saves).await {
            match result {
                Ok(()) => report.saved.push(task_id),
                Err(err) => report.failed.push(err),
            }
        }
        report
    }

    /// Persists a checkpoint of every launched task in `state`.
    pub async fn save_launched(&self, state: &SharedSchedulerState) -> SaveReport {
        let launched = state.launched();
        self.save_all(&launched).await
    }

    /// Removes the node for `task_id` and everything below it.
    ///
    /// Failures are logged and returned; callers must not assume the node
    /// is gone after an error.
    pub async fn delete(&self, task_id: &str) -> Result<(), RecoveryError> {
        check_task_id(task_id)?;
        let path = self.task_path(task_id);
        match self
            .bounded(StoreOp::DeleteNode, &path, self.store.delete_node(&path))
            .await
        {
            Ok(()) => {
                tracing::debug!(task_id, "deleted task node");
                Ok(())
            }
            Err(err) => {
                tracing::error!(task_id, error = %err, "failed to delete task node");
                Err(err)
            }
        }
    }

    /// Loads every persisted task and reconciles it into `state`.
    ///
    /// Child nodes are read concurrently, at most
    /// [`max_in_flight_reads`](RecoveryConfig::max_in_flight_reads) at a
    /// time, in no particular order. The returned future completes only
    /// once every child has settled, so the report and `state` are final
    /// when it resolves.
    ///
    /// A missing tasks namespace means nothing was ever saved and yields an
    /// empty report.
    ///
    /// # Errors
    ///
    /// [`RecoveryError::Store`] if the namespace cannot be listed. No child
    /// is processed in that case.
    pub async fn load_all(&self, state: &SharedSchedulerState) -> Result<LoadReport, RecoveryError> {
        let namespace = self.tasks_path();
        let children = match self
            .bounded(
                StoreOp::ListChildren,
                &namespace,
                self.store.list_children(&namespace),
            )
            .await
        {
            Ok(children) => children,
            Err(RecoveryError::Store {
                source: StoreError::NoNode { .. },
                ..
            }) => {
                tracing::info!(path = %namespace, "no task namespace, nothing to recover");
                Vec::new()
            }
            Err(err) => {
                tracing::error!(path = %namespace, error = %err, "could not load task information");
                return Err(err);
            }
        };

        let mut report = LoadReport {
            listed: children.len(),
            ..LoadReport::default()
        };

        let mut outcomes = futures::stream::iter(children)
            .map(|child| self.load_child(child, state))
            .buffer_unordered(self.config.max_in_flight_reads);
        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        tracing::info!(
            listed = report.listed,
            launched = report.launched.len(),
            killed = report.killed.len(),
            stale = report.stale.len(),
            corrupt = report.corrupt.len(),
            failed = report.failed.len(),
            "task load complete"
        );
        Ok(report)
    }

    async fn load_child(&self, child: String, state: &SharedSchedulerState) -> ChildOutcome {
        let path = self.task_path(&child);
        let data = match self
            .bounded(StoreOp::ReadNode, &path, self.store.read_node(&path))
            .await
        {
            Ok(data) => data,
            Err(err) => {
                // Unreachable is not absent: the node is kept.
                tracing::error!(node = %child, error = %err, "could not load task information");
                return ChildOutcome::Failed(err);
            }
        };

        let record = match TaskRecord::from_document(&child, &data) {
            Ok(record) => record,
            Err(RecoveryError::MissingData { .. }) => {
                tracing::warn!(node = %child, "task node has no data, pruning");
                let cleanup = self.delete(&child).await.err();
                return ChildOutcome::Corrupt {
                    node: child,
                    cleanup,
                };
            }
            Err(err) => {
                tracing::error!(node = %child, error = %err, "malformed task document");
                return ChildOutcome::Failed(err);
            }
        };

        if record.task_id != child {
            let err = RecoveryError::IdentityMismatch {
                node: child,
                task_id: record.task_id,
            };
            tracing::error!(error = %err, "task document does not match its node");
            return ChildOutcome::Failed(err);
        }

        tracing::debug!(task_id = %record.task_id, name = %record.name, "loading task");
        let task_id = record.task_id.clone();
        match state.reconcile(&self.reconciler, record) {
            Ok(Disposition::Stale) => {
                tracing::warn!(task_id = %task_id, "task was never dispatched, deleting");
                let cleanup = self.delete(&task_id).await.err();
                ChildOutcome::Classified {
                    task_id,
                    disposition: Disposition::Stale,
                    cleanup,
                }
            }
            Ok(disposition) => ChildOutcome::Classified {
                task_id,
                disposition,
                cleanup: None,
            },
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "could not classify task");
                ChildOutcome::Failed(err)
            }
        }
    }
}

/// Task IDs are node names: one non-empty segment, never `.` or `..`.
fn check_task_id(task_id: &str) -> Result<(), RecoveryError> {
    if task_id.is_empty() || task_id.contains('/') || task_id == "." || task_id == ".." {
        tracing::error!(task_id, "rejecting task id that is not a single node name");
        return Err(RecoveryError::InvalidTaskId {
            task_id: task_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PendingTask;
    use crate::store::memory::InMemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn repo() -> TaskRepository<Arc<InMemoryStore>> {
        TaskRepository::new(
            Arc::new(InMemoryStore::new()),
            RecoveryConfig::default().with_service_path("/svc"),
        )
        .unwrap()
    }

    #[test]
    fn paths_follow_service_root() {
        let repo = repo();
        assert_eq!(repo.tasks_path(), "/svc/tasks");
        assert_eq!(repo.task_path("t1"), "/svc/tasks/t1");
    }

    #[tokio::test]
    async fn save_writes_document_to_task_node() {
        let repo = repo();
        let record = TaskRecord::with_id("t1", "w1").with_agent("a1");
        repo.save(&record).await.unwrap();

        let data = repo.store().data("/svc/tasks/t1").unwrap();
        assert_eq!(TaskRecord::from_document("t1", &data).unwrap(), record);
    }

    #[tokio::test]
    async fn failed_create_skips_write() {
        let repo = repo();
        repo.store().fail_on(StoreOp::CreatePath, "/svc/tasks/t1");

        let err = repo.save(&TaskRecord::with_id("t1", "w1")).await.unwrap_err();

        assert!(matches!(err, RecoveryError::Store { op: StoreOp::CreatePath, .. }));
        assert_eq!(repo.store().calls(StoreOp::WriteNode), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_empty_node() {
        let repo = repo();
        repo.store().fail_on(StoreOp::WriteNode, "/svc/tasks/t1");

        let err = repo.save(&TaskRecord::with_id("t1", "w1")).await.unwrap_err();

        assert!(matches!(err, RecoveryError::Store { op: StoreOp::WriteNode, .. }));
        assert_eq!(repo.store().data("/svc/tasks/t1"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn delete_missing_node_reports_error() {
        let repo = repo();
        let err = repo.delete("nope").await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::Store {
                source: StoreError::NoNode { .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_calls_time_out() {
        let repo = TaskRepository::new(
            Arc::new(InMemoryStore::new()),
            RecoveryConfig::default()
                .with_service_path("/svc")
                .with_operation_timeout(Duration::from_millis(100)),
        )
        .unwrap();
        repo.store().seed("/svc/tasks/t1", b"");
        repo.store().delay_reads("/svc/tasks/t1", Duration::from_secs(60));

        let state = SharedSchedulerState::new();
        let report = repo.load_all(&state).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0],
            RecoveryError::Store {
                source: StoreError::Timeout { timeout_ms: 100, .. },
                ..
            }
        ));
        // A timeout is transient: the empty node is not pruned.
        assert!(repo.store().contains("/svc/tasks/t1"));
        assert!(report.corrupt.is_empty());
    }

    #[tokio::test]
    async fn load_without_namespace_is_empty() {
        let repo = repo();
        let report = repo.load_all(&SharedSchedulerState::new()).await.unwrap();
        assert_eq!(report.listed, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn list_failure_aborts_load() {
        let repo = repo();
        repo.save(&TaskRecord::with_id("t1", "w1")).await.unwrap();
        repo.store().fail_on(StoreOp::ListChildren, "/svc/tasks");

        let state = SharedSchedulerState::with_pending([PendingTask::new("w1")]);
        let err = repo.load_all(&state).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(repo.store().calls(StoreOp::ReadNode), 0);
        assert_eq!(state.pending().len(), 1);
    }

    #[tokio::test]
    async fn save_launched_checkpoints_launched_tasks() {
        let repo = repo();
        let state = SharedSchedulerState::new();
        state.with_state(|s| {
            s.launched.push(TaskRecord::with_id("t1", "w1").with_agent("a1"));
            s.launched.push(TaskRecord::with_id("t2", "w2").with_agent("a2"));
        });

        let report = repo.save_launched(&state).await;

        assert_eq!(report.saved.len(), 2);
        assert!(report.failed.is_empty());
        assert!(repo.store().contains("/svc/tasks/t1"));
        assert!(repo.store().contains("/svc/tasks/t2"));
    }

    #[test]
    fn new_rejects_zero_read_bound() {
        let result = TaskRepository::new(
            Arc::new(InMemoryStore::new()),
            RecoveryConfig::default().with_max_in_flight_reads(0),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn new_rejects_zero_timeout() {
        let result = TaskRepository::new(
            Arc::new(InMemoryStore::new()),
            RecoveryConfig::default().with_operation_timeout(Duration::ZERO),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn invalid_task_ids_never_reach_the_store() {
        let repo = repo();
        for id in ["", "group/t1", "/t1", ".", ".."] {
            let err = repo.save(&TaskRecord::with_id(id, "w1")).await.unwrap_err();
            assert!(matches!(err, RecoveryError::InvalidTaskId { ref task_id } if task_id == id));

            let err = repo.delete(id).await.unwrap_err();
            assert!(matches!(err, RecoveryError::InvalidTaskId { .. }));
        }
        assert_eq!(repo.store().calls(StoreOp::CreatePath), 0);
        assert_eq!(repo.store().calls(StoreOp::DeleteNode), 0);
        assert!(repo.store().is_empty());
    }
}
