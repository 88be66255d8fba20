//! Store layout names, configuration defaults and environment keys.

/// Name of the namespace node holding one child per persisted task.
///
/// Task documents live at `{service_path}/tasks/{task_id}`.
pub const TASKS_NODE: &str = "tasks";

/// Service root used when no configuration overrides it.
pub const DEFAULT_SERVICE_PATH: &str = "/scheduler";

/// Upper bound on a single store operation, in milliseconds.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Maximum number of node reads `load_all` keeps in flight at once.
pub const DEFAULT_MAX_IN_FLIGHT_READS: usize = 64;

/// Configuration file looked up in the working directory by
/// [`RecoveryConfig::load`](crate::config::RecoveryConfig::load).
pub const CONFIG_FILE_NAME: &str = ".scheduler-recovery.toml";

/// Prefix shared by every environment variable override.
pub const ENV_PREFIX: &str = "SCHEDULER_RECOVERY_";
