//! Error types for task recovery.
//!
//! [`RecoveryError`] is the domain error returned by
//! [`TaskRepository`](crate::repository::TaskRepository) and the
//! [`Reconciler`](crate::reconcile::Reconciler). Store failures are wrapped
//! with the operation and path that failed.

use thiserror::Error;

use crate::store::backend::{StoreError, StoreOp};

/// Errors that can occur while persisting or recovering tasks.
///
/// Every variant names the task or node it concerns. None of them abort a
/// recovery load on their own: `load_all` logs them and lists them in
/// [`LoadReport::failed`](crate::repository::LoadReport::failed).
///
/// # Examples
///
/// ```
/// use scheduler_recovery::RecoveryError;
///
/// let err = RecoveryError::DuplicatePending {
///     name: "web".to_string(),
///     count: 2,
/// };
/// assert!(!err.is_transient());
/// assert!(err.to_string().contains("web"));
/// ```
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A store operation failed or timed out.
    #[error("{op} failed on {path}: {source}")]
    Store {
        /// The operation that failed.
        op: StoreOp,
        /// The node it was issued against.
        path: String,
        /// The store error.
        #[source]
        source: StoreError,
    },

    /// A record could not be serialized.
    #[error("failed to encode task {task_id}: {source}")]
    Encode {
        /// The record being saved.
        task_id: String,
        /// The serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A node payload is not a valid task document.
    #[error("malformed task document in node {node}: {source}")]
    Decode {
        /// The child node that was read.
        node: String,
        /// The deserializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A task node exists but carries no data (crashed write).
    #[error("task node {node} has no data")]
    MissingData {
        /// The child node that was read.
        node: String,
    },

    /// A document's `taskId` does not match the node it was stored under.
    #[error("task node {node} holds a document for task {task_id}")]
    IdentityMismatch {
        /// The child node that was read.
        node: String,
        /// The `taskId` found in the document.
        task_id: String,
    },

    /// A task ID that cannot be used as a single node name.
    #[error("invalid task id {task_id:?}: must be one non-empty path segment")]
    InvalidTaskId {
        /// The rejected ID.
        task_id: String,
    },

    /// More than one pending task shares the record's name.
    #[error("{count} pending tasks share the name {name}")]
    DuplicatePending {
        /// The ambiguous name.
        name: String,
        /// How many pending entries carry it.
        count: usize,
    },
}

impl RecoveryError {
    pub(crate) fn store(op: StoreOp, path: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            op,
            path: path.into(),
            source,
        }
    }

    /// `true` for failures caused by store reachability (errors and
    /// timeouts) rather than by the data itself. Transient failures never
    /// cause a node to be deleted.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// The node or task this error concerns.
    pub fn subject(&self) -> &str {
        match self {
            Self::Store { path, .. } => path,
            Self::Encode { task_id, .. } | Self::InvalidTaskId { task_id } => task_id,
            Self::Decode { node, .. }
            | Self::MissingData { node }
            | Self::IdentityMismatch { node, .. } => node,
            Self::DuplicatePending { name, .. } => name,
        }
    }
}
