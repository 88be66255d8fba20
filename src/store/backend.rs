//! Coordination store trait and supporting types.
//!
//! The [`CoordinationStore`] trait is the contract a hierarchical
//! coordination service client implements. It exposes five node operations:
//! [`list_children`](CoordinationStore::list_children),
//! [`read_node`](CoordinationStore::read_node),
//! [`create_path`](CoordinationStore::create_path),
//! [`write_node`](CoordinationStore::write_node) and
//! [`delete_node`](CoordinationStore::delete_node).
//!
//! Domain logic (document encoding, corruption detection, classification)
//! does **not** belong here. Stores are dumb node trees; domain logic lives
//! in [`TaskRepository`](crate::repository::TaskRepository).
//!
//! # Path Layout
//!
//! Paths are absolute, slash-separated node names. Task documents live at
//! `{service_path}/tasks/{task_id}`; use [`tasks_path`] and [`task_path`]
//! rather than formatting paths by hand.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::TASKS_NODE;

/// Identifies a store operation in errors and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`CoordinationStore::list_children`]
    ListChildren,
    /// [`CoordinationStore::read_node`]
    ReadNode,
    /// [`CoordinationStore::create_path`]
    CreatePath,
    /// [`CoordinationStore::write_node`]
    WriteNode,
    /// [`CoordinationStore::delete_node`]
    DeleteNode,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListChildren => "list_children",
            Self::ReadNode => "read_node",
            Self::CreatePath => "create_path",
            Self::WriteNode => "write_node",
            Self::DeleteNode => "delete_node",
        };
        f.write_str(name)
    }
}

/// Errors raised by a coordination store.
///
/// These are low-level errors. [`TaskRepository`](crate::repository::TaskRepository)
/// wraps them in [`RecoveryError::Store`](crate::error::RecoveryError::Store)
/// together with the operation and path that failed.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::store::backend::StoreError;
///
/// let err = StoreError::NoNode { path: "/svc/tasks/t1".to_string() };
/// assert!(err.to_string().contains("/svc/tasks/t1"));
/// ```
#[derive(Debug, Error)]
pub enum StoreError {
    /// The node (or, for listings and writes, its parent) does not exist.
    #[error("no node: {path}")]
    NoNode {
        /// The path that was not found.
        path: String,
    },

    /// The operation did not complete within the configured bound.
    #[error("{op} timed out after {timeout_ms}ms on {path}")]
    Timeout {
        /// The operation that timed out.
        op: StoreOp,
        /// The path it was issued against.
        path: String,
        /// The bound that expired.
        timeout_ms: u64,
    },

    /// A connection, session or server-side failure.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Shorthand for a [`StoreError::Backend`] with no underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }
}

/// Hierarchical coordination store used for durable task bookkeeping.
///
/// Implementations wrap a ZooKeeper-like client. Every operation is
/// asynchronous and completes with a value or a [`StoreError`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: `load_all` keeps many reads in
/// flight against one store.
///
/// # No Domain Logic
///
/// Stores never inspect payloads. An empty payload is returned as an empty
/// vector, not as an error.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Lists the names (not full paths) of the direct children of `path`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoNode`] if `path` does not exist.
    /// - [`StoreError::Backend`] on connection failures.
    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Reads the data payload of a node. A node created without data yields
    /// an empty vector.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoNode`] if `path` does not exist.
    /// - [`StoreError::Backend`] on connection failures.
    async fn read_node(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Creates `path` and any missing ancestors. Succeeds if the node
    /// already exists; existing data is left untouched.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Backend`] on connection failures.
    async fn create_path(&self, path: &str) -> Result<(), StoreError>;

    /// Overwrites the data payload of an existing node.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoNode`] if `path` does not exist.
    /// - [`StoreError::Backend`] on connection failures.
    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Removes `path` and all of its descendants.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NoNode`] if `path` does not exist.
    /// - [`StoreError::Backend`] on connection failures.
    async fn delete_node(&self, path: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CoordinationStore + ?Sized> CoordinationStore for Arc<S> {
    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_children(path).await
    }

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        (**self).read_node(path).await
    }

    async fn create_path(&self, path: &str) -> Result<(), StoreError> {
        (**self).create_path(path).await
    }

    async fn write_node(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write_node(path, data).await
    }

    async fn delete_node(&self, path: &str) -> Result<(), StoreError> {
        (**self).delete_node(path).await
    }
}

/// Returns the namespace node under which every task document lives.
///
/// Trailing slashes on `service_path` are ignored.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::store::backend::tasks_path;
///
/// assert_eq!(tasks_path("/svc"), "/svc/tasks");
/// assert_eq!(tasks_path("/svc/"), "/svc/tasks");
/// ```
pub fn tasks_path(service_path: &str) -> String {
    format!("{}/{TASKS_NODE}", service_path.trim_end_matches('/'))
}

/// Returns the node path for a single task document.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::store::backend::task_path;
///
/// assert_eq!(task_path("/svc", "t1"), "/svc/tasks/t1");
/// ```
pub fn task_path(service_path: &str, task_id: &str) -> String {
    format!("{}/{task_id}", tasks_path(service_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::NoNode {
            path: "/a/b".to_string(),
        };
        assert_eq!(err.to_string(), "no node: /a/b");

        let err = StoreError::Timeout {
            op: StoreOp::ReadNode,
            path: "/a/b".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "read_node timed out after 250ms on /a/b");

        assert_eq!(
            StoreError::backend("session expired").to_string(),
            "backend error: session expired"
        );
    }

    #[test]
    fn store_error_source_is_exposed() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = StoreError::Backend {
            message: "connection lost".to_string(),
            source: Some(Box::new(inner)),
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("reset"));
        assert!(std::error::Error::source(&StoreError::backend("x")).is_none());
    }

    #[test]
    fn paths_normalise_trailing_slashes() {
        assert_eq!(tasks_path("/scheduler"), "/scheduler/tasks");
        assert_eq!(tasks_path("/scheduler//"), "/scheduler/tasks");
        assert_eq!(task_path("/scheduler/", "abc"), "/scheduler/tasks/abc");
    }

    #[test]
    fn task_path_is_child_of_tasks_path() {
        let parent = tasks_path("/svc");
        let child = task_path("/svc", "t9");
        assert!(child.starts_with(&parent));
        assert_eq!(child.rsplit('/').next(), Some("t9"));
    }
}
