//! Cluster API access
//!
//! [`ClusterClient`] abstracts the cluster's REST API so actions and the
//! completion tracker can be exercised against mocks. [`HttpClusterClient`]
//! is the production implementation.
//!
//! The poll loop only ever calls the read-only methods. Mutations are issued
//! once by an action before it hands over to the poll loop.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::Result;

mod http;
mod types;

pub use http::HttpClusterClient;
pub use types::{
    ClusterHealth, HealthStatus, IndexRecovery, IndexSettings, ReindexParams, RolloverResponse,
    ShardRecovery, SnapshotInfo, SnapshotState, TaskInfo, TaskResponse, TaskStatus,
};

/// Trait abstracting the cluster REST API
///
/// Every method may fail with a transport-level error. Callers in the wait
/// path treat such failures as terminal for the polling session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    // ---------------------------------------------------------------------
    // Read-only
    // ---------------------------------------------------------------------

    /// Cluster health, scoped to `indices` when non-empty
    async fn cluster_health(&self, indices: &[String]) -> Result<ClusterHealth>;

    /// State of a single snapshot
    async fn snapshot_status(&self, repository: &str, name: &str) -> Result<SnapshotInfo>;

    /// Every snapshot in a repository
    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>>;

    /// Status of an asynchronous task
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus>;

    /// Names of all indices, open or closed
    async fn list_indices(&self) -> Result<Vec<String>>;

    /// Shard and replica counts of one index
    async fn index_settings(&self, index: &str) -> Result<IndexSettings>;

    /// Shard recovery progress for the given indices
    async fn index_recovery(&self, indices: &[String]) -> Result<BTreeMap<String, IndexRecovery>>;

    /// Whether a snapshot repository is registered
    async fn repository_exists(&self, repository: &str) -> Result<bool>;

    /// Ask every node to verify write access to the repository
    async fn verify_repository(&self, repository: &str) -> Result<()>;

    /// Alias names attached to each index
    async fn index_aliases(&self) -> Result<BTreeMap<String, Vec<String>>>;

    // ---------------------------------------------------------------------
    // Mutating
    // ---------------------------------------------------------------------

    /// Update index settings
    async fn put_index_settings(&self, indices: &[String], settings: &Value) -> Result<()>;

    /// Update cluster settings
    async fn put_cluster_settings(&self, body: &Value) -> Result<()>;

    /// Create an index with the given settings and mappings
    async fn create_index(&self, name: &str, body: &Value) -> Result<()>;

    /// Delete indices
    ///
    /// `None` uses the client's configured master timeout.
    async fn delete_indices(
        &self,
        indices: &[String],
        master_timeout: Option<Duration>,
    ) -> Result<()>;

    /// Open closed indices
    async fn open_indices(&self, indices: &[String]) -> Result<()>;

    /// Close open indices
    async fn close_indices(&self, indices: &[String]) -> Result<()>;

    /// Flush indices before closing them
    async fn flush_indices(&self, indices: &[String]) -> Result<()>;

    /// Remove every alias from the indices
    async fn delete_aliases(&self, indices: &[String]) -> Result<()>;

    /// Apply a batch of alias `add`/`remove` actions atomically
    async fn update_aliases(&self, body: &Value) -> Result<()>;

    /// Roll the alias over to a new index if its conditions are met
    ///
    /// With `dry_run` the conditions are evaluated but nothing changes.
    async fn rollover(
        &self,
        alias: &str,
        body: &Value,
        dry_run: bool,
        wait_for_active_shards: &str,
    ) -> Result<RolloverResponse>;

    /// Merge an index down to at most `max_num_segments` per shard
    async fn forcemerge(&self, index: &str, max_num_segments: u32) -> Result<()>;

    /// Start a snapshot without waiting for it
    async fn create_snapshot(&self, repository: &str, name: &str, body: &Value) -> Result<()>;

    /// Start a restore without waiting for it
    async fn restore_snapshot(&self, repository: &str, name: &str, body: &Value) -> Result<()>;

    /// Delete a snapshot
    async fn delete_snapshot(&self, repository: &str, name: &str) -> Result<()>;

    /// Submit a reindex without waiting, returning its task id
    async fn reindex(&self, body: &Value, params: &ReindexParams) -> Result<String>;
}
