//! Typed views of the cluster API responses the tool reads.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cluster or index-scoped health color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All primary and replica shards are allocated
    #[default]
    Green,
    /// All primaries are allocated, some replicas are not
    Yellow,
    /// At least one primary shard is unallocated
    Red,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        };
        f.write_str(s)
    }
}

/// Response of the cluster health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterHealth {
    /// Cluster name
    #[serde(default)]
    pub cluster_name: String,
    /// Health color
    pub status: HealthStatus,
    /// Shards currently moving between nodes
    #[serde(default)]
    pub relocating_shards: u32,
    /// Shards being initialized
    #[serde(default)]
    pub initializing_shards: u32,
    /// Shards with no node assigned
    #[serde(default)]
    pub unassigned_shards: u32,
    /// Active primary and replica shards
    #[serde(default)]
    pub active_shards: u32,
    /// Active primary shards
    #[serde(default)]
    pub active_primary_shards: u32,
}

impl ClusterHealth {
    /// Health with the given color and no shard activity
    pub fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Lifecycle state of a snapshot as reported by the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotState {
    /// Snapshot is still being written
    InProgress,
    /// Every shard was snapshotted
    Success,
    /// Some shards could not be snapshotted
    Partial,
    /// The snapshot failed
    Failed,
    /// The snapshot was written by an incompatible cluster version
    Incompatible,
    /// A state this tool does not know about
    #[serde(other)]
    Unknown,
}

impl SnapshotState {
    /// Whether the snapshot has stopped changing
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress | Self::Unknown)
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Incompatible => "INCOMPATIBLE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One snapshot entry from a repository listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot name
    #[serde(rename = "snapshot")]
    pub name: String,
    /// Current state
    pub state: SnapshotState,
    /// Indices contained in the snapshot
    #[serde(default)]
    pub indices: Vec<String>,
    /// Start time in epoch milliseconds
    #[serde(default)]
    pub start_time_in_millis: Option<u64>,
}

impl SnapshotInfo {
    /// Snapshot entry with the given name and state and no indices
    pub fn new(name: impl Into<String>, state: SnapshotState) -> Self {
        Self {
            name: name.into(),
            state,
            indices: Vec::new(),
            start_time_in_millis: None,
        }
    }
}

/// Repository listing wrapper: `{"snapshots": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SnapshotList {
    #[serde(default)]
    pub snapshots: Vec<SnapshotInfo>,
}

/// Task metadata inside a task status response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Action name, e.g. `indices:data/write/reindex`
    #[serde(default)]
    pub action: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Time the task has been running
    #[serde(default)]
    pub running_time_in_nanos: u64,
}

/// Result body of a finished task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Documents processed
    #[serde(default)]
    pub total: u64,
    /// Documents created
    #[serde(default)]
    pub created: u64,
    /// Documents updated
    #[serde(default)]
    pub updated: u64,
    /// Per-document or per-shard failures
    #[serde(default)]
    pub failures: Vec<Value>,
}

/// Response of the task management endpoint for a single task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The task is no longer running
    #[serde(default)]
    pub completed: bool,
    /// Task metadata
    #[serde(default)]
    pub task: TaskInfo,
    /// Error recorded by the task, if it failed outright
    #[serde(default)]
    pub error: Option<Value>,
    /// Result recorded by the task once it finished
    #[serde(default)]
    pub response: Option<TaskResponse>,
}

impl TaskStatus {
    /// The error text when the task recorded an error
    ///
    /// Object errors are rendered as their `reason` field when present.
    pub fn error_text(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        match error {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => match map.get("reason").and_then(Value::as_str) {
                Some(reason) => Some(reason.to_string()),
                None => Some(error.to_string()),
            },
            other => Some(other.to_string()),
        }
    }

    /// Failures reported in a completed task's response, rendered as text
    pub fn failure_texts(&self) -> Vec<String> {
        self.response
            .as_ref()
            .map(|r| {
                r.failures
                    .iter()
                    .map(|f| {
                        f.pointer("/cause/reason")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| f.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// How long the task has been running
    pub fn running_time(&self) -> Duration {
        Duration::from_nanos(self.task.running_time_in_nanos)
    }
}

/// Shard and replica counts for one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSettings {
    /// Primary shard count
    pub number_of_shards: u32,
    /// Replicas per primary
    pub number_of_replicas: u32,
}

impl IndexSettings {
    /// Extract the counts from a `GET /{index}/_settings` body.
    ///
    /// The cluster renders numeric settings as strings.
    pub fn from_settings_body(index: &str, body: &Value) -> Option<Self> {
        let settings = body.get(index)?.pointer("/settings/index")?;
        let read = |key: &str| -> Option<u32> {
            match settings.get(key)? {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_u64().map(|n| n as u32),
                _ => None,
            }
        };
        Some(Self {
            number_of_shards: read("number_of_shards")?,
            number_of_replicas: read("number_of_replicas")?,
        })
    }
}

/// Recovery stage of a single shard copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecovery {
    /// Stage name; `DONE` once the copy is fully recovered
    pub stage: String,
}

/// Recovery information for one index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexRecovery {
    /// Shard copies being or having been recovered
    #[serde(default)]
    pub shards: Vec<ShardRecovery>,
}

impl IndexRecovery {
    /// Whether every shard copy reports stage `DONE`
    pub fn is_done(&self) -> bool {
        !self.shards.is_empty() && self.shards.iter().all(|s| s.stage == "DONE")
    }
}

/// Aliases of one index in a `GET /_alias` response
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IndexAliases {
    #[serde(default)]
    pub aliases: BTreeMap<String, Value>,
}

/// Response of the rollover endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RolloverResponse {
    /// Index the alias pointed at before the call
    #[serde(default)]
    pub old_index: String,
    /// Index the alias points at, or would point at, afterwards
    #[serde(default)]
    pub new_index: String,
    /// Whether the alias was moved
    #[serde(default)]
    pub rolled_over: bool,
    /// Whether this was only an evaluation
    #[serde(default)]
    pub dry_run: bool,
    /// Result of each condition, keyed by its rendered form
    #[serde(default)]
    pub conditions: BTreeMap<String, bool>,
}

/// Query parameters for a reindex submission
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexParams {
    /// Refresh the destination index when done
    pub refresh: bool,
    /// Throttle in sub-requests per second; `None` means unthrottled
    pub requests_per_second: Option<f64>,
    /// Number of slices the task is divided into
    pub slices: u32,
    /// How long each bulk request waits for unavailable shards
    pub timeout: Duration,
    /// Shard copies that must be active before proceeding (`"all"` or a count)
    pub wait_for_active_shards: String,
}

impl Default for ReindexParams {
    fn default() -> Self {
        Self {
            refresh: true,
            requests_per_second: None,
            slices: 1,
            timeout: Duration::from_secs(60),
            wait_for_active_shards: "1".to_string(),
        }
    }
}
