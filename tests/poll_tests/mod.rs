//! Integration tests for completion tracking and lifecycle actions
//!
//! These tests drive the public API against [`FakeCluster`], a scripted
//! in-memory cluster, under tokio's paused clock so multi-minute waits run
//! instantly and elapsed times are exact.
//!
//! # Test Organization
//!
//! - `scenarios`: Stories about single polling sessions: completion,
//!   cluster-reported failure, budget exhaustion and the delete retry
//!
//! - `actions`: Stories about actions handing over to the poll loop and
//!   deciding what a timed-out wait means for them
//!
//! - `properties`: Property tests for budget accounting and index chunking
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test poll
//! ```

mod actions;
mod properties;
mod scenarios;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use shardkeeper::client::{
    ClusterClient, ClusterHealth, IndexRecovery, IndexSettings, ReindexParams, RolloverResponse,
    ShardRecovery, SnapshotInfo, SnapshotState, TaskStatus,
};
use shardkeeper::{Error, Result};

/// A sequence of responses; the last one repeats once the script runs out
pub struct Script<T> {
    steps: Vec<T>,
    reads: AtomicU32,
}

impl<T: Clone> Script<T> {
    pub fn new(steps: Vec<T>) -> Self {
        Self {
            steps,
            reads: AtomicU32::new(0),
        }
    }

    fn next(&self, what: &str) -> Result<T> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) as usize;
        match self.steps.get(n.min(self.steps.len().saturating_sub(1))) {
            Some(step) => Ok(step.clone()),
            None => Err(Error::not_found(what.to_string())),
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            reads: AtomicU32::new(0),
        }
    }
}

/// Scripted cluster recording every mutating call
#[derive(Default)]
pub struct FakeCluster {
    pub health: Script<ClusterHealth>,
    pub snapshot_states: Script<SnapshotState>,
    pub tasks: Script<TaskStatus>,
    pub indices: Script<Vec<String>>,
    pub snapshots: Vec<SnapshotInfo>,
    pub replicas: u32,
    pub aliases: BTreeMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutating calls in the order they were made
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn cluster_health(&self, _indices: &[String]) -> Result<ClusterHealth> {
        self.health.next("cluster health")
    }

    async fn snapshot_status(&self, _repository: &str, name: &str) -> Result<SnapshotInfo> {
        let state = self.snapshot_states.next("snapshot state")?;
        Ok(SnapshotInfo::new(name, state))
    }

    async fn list_snapshots(&self, _repository: &str) -> Result<Vec<SnapshotInfo>> {
        Ok(self.snapshots.clone())
    }

    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus> {
        self.tasks.next("task")
    }

    async fn list_indices(&self) -> Result<Vec<String>> {
        self.indices.next("index list")
    }

    async fn index_settings(&self, _index: &str) -> Result<IndexSettings> {
        Ok(IndexSettings {
            number_of_shards: 1,
            number_of_replicas: self.replicas,
        })
    }

    async fn index_recovery(&self, indices: &[String]) -> Result<BTreeMap<String, IndexRecovery>> {
        Ok(indices
            .iter()
            .map(|index| {
                let recovery = IndexRecovery {
                    shards: vec![ShardRecovery {
                        stage: "DONE".to_string(),
                    }],
                };
                (index.clone(), recovery)
            })
            .collect())
    }

    async fn index_aliases(&self) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(self.aliases.clone())
    }

    async fn repository_exists(&self, _repository: &str) -> Result<bool> {
        Ok(true)
    }

    async fn verify_repository(&self, _repository: &str) -> Result<()> {
        Ok(())
    }

    async fn put_index_settings(&self, indices: &[String], _settings: &Value) -> Result<()> {
        self.record(format!("put_index_settings {}", indices.join(",")));
        Ok(())
    }

    async fn put_cluster_settings(&self, _body: &Value) -> Result<()> {
        self.record("put_cluster_settings");
        Ok(())
    }

    async fn create_index(&self, name: &str, _body: &Value) -> Result<()> {
        self.record(format!("create_index {}", name));
        Ok(())
    }

    async fn delete_indices(
        &self,
        indices: &[String],
        _master_timeout: Option<Duration>,
    ) -> Result<()> {
        self.record(format!("delete_indices {}", indices.join(",")));
        Ok(())
    }

    async fn open_indices(&self, indices: &[String]) -> Result<()> {
        self.record(format!("open_indices {}", indices.join(",")));
        Ok(())
    }

    async fn close_indices(&self, indices: &[String]) -> Result<()> {
        self.record(format!("close_indices {}", indices.join(",")));
        Ok(())
    }

    async fn flush_indices(&self, indices: &[String]) -> Result<()> {
        self.record(format!("flush_indices {}", indices.join(",")));
        Ok(())
    }

    async fn delete_aliases(&self, indices: &[String]) -> Result<()> {
        self.record(format!("delete_aliases {}", indices.join(",")));
        Ok(())
    }

    async fn update_aliases(&self, body: &Value) -> Result<()> {
        let count = body["actions"].as_array().map_or(0, Vec::len);
        self.record(format!("update_aliases {}", count));
        Ok(())
    }

    async fn rollover(
        &self,
        alias: &str,
        _body: &Value,
        dry_run: bool,
        _wait_for_active_shards: &str,
    ) -> Result<RolloverResponse> {
        if !dry_run {
            self.record(format!("rollover {}", alias));
        }
        Ok(RolloverResponse {
            rolled_over: !dry_run,
            dry_run,
            ..Default::default()
        })
    }

    async fn forcemerge(&self, index: &str, max_num_segments: u32) -> Result<()> {
        self.record(format!("forcemerge {} {}", index, max_num_segments));
        Ok(())
    }

    async fn create_snapshot(&self, repository: &str, name: &str, _body: &Value) -> Result<()> {
        self.record(format!("create_snapshot {}/{}", repository, name));
        Ok(())
    }

    async fn restore_snapshot(&self, repository: &str, name: &str, _body: &Value) -> Result<()> {
        self.record(format!("restore_snapshot {}/{}", repository, name));
        Ok(())
    }

    async fn delete_snapshot(&self, repository: &str, name: &str) -> Result<()> {
        self.record(format!("delete_snapshot {}/{}", repository, name));
        Ok(())
    }

    async fn reindex(&self, _body: &Value, _params: &ReindexParams) -> Result<String> {
        self.record("reindex");
        Ok("node-1:42".to_string())
    }
}
