//! Task documents: the persisted [`TaskRecord`] and the in-memory
//! [`PendingTask`] it is matched against.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RecoveryError;

/// Document keys owned by the typed fields of [`TaskRecord`].
const RECORD_FIELDS: [&str; 3] = ["taskId", "name", "runtimeInfo"];

/// Document keys owned by the typed fields of [`RuntimeInfo`].
const RUNTIME_FIELDS: [&str; 1] = ["agentId"];

/// Runtime details attached once a task has been dispatched.
///
/// Only `agentId` is interpreted; every other field the scheduler stores
/// (host, ports, container id, ...) is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// Agent the task was dispatched to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Fields this crate does not interpret. An `agentId` key here is
    /// dropped on encode.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Durable representation of one task, stored at
/// `{service_path}/tasks/{task_id}` as a JSON document.
///
/// `task_id` is the node name and never changes once assigned. `name` is
/// the logical identity used to match the record against pending tasks
/// after a restart.
///
/// # Examples
///
/// ```
/// use scheduler_recovery::TaskRecord;
///
/// let record = TaskRecord::new("worker-1");
/// assert!(!record.is_dispatched());
///
/// let record = record.with_agent("agent-9");
/// assert_eq!(record.agent_id(), Some("agent-9"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique, immutable identifier; also the store node name.
    pub task_id: String,

    /// Logical task identity, stable across restarts.
    pub name: String,

    /// Present once the scheduler has heard back about a dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_info: Option<RuntimeInfo>,

    /// Fields this crate does not interpret. Keys that name a typed field
    /// (`taskId`, `name`, `runtimeInfo`) are dropped on encode.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Creates an undispatched record with a fresh `UUIDv4` task ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Creates an undispatched record with an explicit task ID.
    pub fn with_id(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            runtime_info: None,
            extra: Map::new(),
        }
    }

    /// Records the agent this task was dispatched to.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.runtime_info.get_or_insert_with(RuntimeInfo::default).agent_id =
            Some(agent_id.into());
        self
    }

    /// The dispatch agent, if any. An empty string counts as absent.
    pub fn agent_id(&self) -> Option<&str> {
        self.runtime_info
            .as_ref()
            .and_then(|info| info.agent_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// `true` if the task reached an agent rather than only being requested.
    pub fn is_dispatched(&self) -> bool {
        self.agent_id().is_some()
    }

    /// Serializes the record into the node payload format.
    ///
    /// The typed fields always win over same-named keys in `extra`.
    pub fn to_document(&self) -> Result<Vec<u8>, RecoveryError> {
        let encoded = if self.has_shadowed_fields() {
            let mut clean = self.clone();
            clean.extra.retain(|key, _| !RECORD_FIELDS.contains(&key.as_str()));
            if let Some(info) = clean.runtime_info.as_mut() {
                info.extra.retain(|key, _| !RUNTIME_FIELDS.contains(&key.as_str()));
            }
            serde_json::to_vec(&clean)
        } else {
            serde_json::to_vec(self)
        };
        encoded.map_err(|source| RecoveryError::Encode {
            task_id: self.task_id.clone(),
            source,
        })
    }

    fn has_shadowed_fields(&self) -> bool {
        self.extra.keys().any(|key| RECORD_FIELDS.contains(&key.as_str()))
            || self.runtime_info.as_ref().is_some_and(|info| {
                info.extra
                    .keys()
                    .any(|key| RUNTIME_FIELDS.contains(&key.as_str()))
            })
    }

    /// Parses a node payload read from `node`.
    ///
    /// An empty payload is reported as [`RecoveryError::MissingData`] so
    /// callers can tell crashed writes apart from malformed documents.
    pub fn from_document(node: &str, data: &[u8]) -> Result<Self, RecoveryError> {
        if data.is_empty() {
            return Err(RecoveryError::MissingData {
                node: node.to_string(),
            });
        }
        serde_json::from_slice(data).map_err(|source| RecoveryError::Decode {
            node: node.to_string(),
            source,
        })
    }
}

/// A task the scheduler currently wants running, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    /// Logical task identity matched against [`TaskRecord::name`].
    pub name: String,

    /// Scheduler-side attributes (resources, command, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl PendingTask {
    /// Creates a pending task with no extra attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn new_assigns_uuid_task_id() {
        let record = TaskRecord::new("w1");
        assert_eq!(record.name, "w1");
        let parsed = Uuid::parse_str(&record.task_id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(record.task_id, TaskRecord::new("w1").task_id);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let record = TaskRecord::with_id("t1", "w1").with_agent("a1");
        let value: Value = serde_json::from_slice(&record.to_document().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"taskId": "t1", "name": "w1", "runtimeInfo": {"agentId": "a1"}})
        );
    }

    #[test]
    fn undispatched_record_omits_runtime_info() {
        let record = TaskRecord::with_id("t1", "w1");
        let value: Value = serde_json::from_slice(&record.to_document().unwrap()).unwrap();
        assert_eq!(value, json!({"taskId": "t1", "name": "w1"}));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let doc = json!({
            "taskId": "t1",
            "name": "w1",
            "cpus": 0.5,
            "runtimeInfo": {"agentId": "a1", "host": "10.0.0.4", "ports": [31000]}
        });
        let bytes = serde_json::to_vec(&doc).unwrap();
        let record = TaskRecord::from_document("t1", &bytes).unwrap();
        assert_eq!(record.extra.get("cpus"), Some(&json!(0.5)));
        assert_eq!(record.agent_id(), Some("a1"));

        let again: Value = serde_json::from_slice(&record.to_document().unwrap()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn typed_fields_win_over_shadowing_extras() {
        let mut record = TaskRecord::with_id("t1", "w1").with_agent("a1");
        record.extra.insert("taskId".to_string(), json!("t9"));
        record.extra.insert("name".to_string(), json!("other"));
        record.extra.insert("cpus".to_string(), json!(2));
        if let Some(info) = record.runtime_info.as_mut() {
            info.extra.insert("agentId".to_string(), json!("a9"));
        }

        let bytes = record.to_document().unwrap();
        let decoded = TaskRecord::from_document("t1", &bytes).unwrap();

        assert_eq!(decoded.task_id, "t1");
        assert_eq!(decoded.name, "w1");
        assert_eq!(decoded.agent_id(), Some("a1"));
        assert_eq!(decoded.extra, Map::from_iter([("cpus".to_string(), json!(2))]));
        // The caller's record is left as it was.
        assert_eq!(record.extra.len(), 3);
    }

    #[test]
    fn empty_or_null_agent_is_not_dispatched() {
        let doc = br#"{"taskId":"t1","name":"w1","runtimeInfo":{"agentId":""}}"#;
        assert!(!TaskRecord::from_document("t1", doc).unwrap().is_dispatched());

        let doc = br#"{"taskId":"t1","name":"w1","runtimeInfo":{"agentId":null}}"#;
        assert!(!TaskRecord::from_document("t1", doc).unwrap().is_dispatched());

        let doc = br#"{"taskId":"t1","name":"w1","runtimeInfo":{}}"#;
        assert!(!TaskRecord::from_document("t1", doc).unwrap().is_dispatched());
    }

    #[test]
    fn empty_payload_is_missing_data() {
        let err = TaskRecord::from_document("t4", b"").unwrap_err();
        assert!(matches!(err, RecoveryError::MissingData { ref node } if node == "t4"));
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let err = TaskRecord::from_document("t5", b"{not json").unwrap_err();
        assert!(matches!(err, RecoveryError::Decode { .. }));

        // Valid JSON missing the required `name` field.
        let err = TaskRecord::from_document("t5", br#"{"taskId":"t5"}"#).unwrap_err();
        assert!(matches!(err, RecoveryError::Decode { .. }));
    }

    #[test]
    fn pending_task_keeps_attributes() {
        let pending: PendingTask =
            serde_json::from_value(json!({"name": "w1", "mem": 512})).unwrap();
        assert_eq!(pending.name, "w1");
        assert_eq!(pending.attributes.get("mem"), Some(&json!(512)));
        assert_eq!(PendingTask::new("w2").attributes.len(), 0);
    }
}
