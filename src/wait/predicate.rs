//! Per-operation completion rules
//!
//! Each predicate issues read-only queries through [`ClusterClient`] and turns
//! the answer into an observed state. The poll loop then asks the predicate
//! whether that state is a failure, whether it is done, and how to describe it.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::actions::chunk_index_list;
use crate::client::{
    ClusterClient, ClusterHealth, HealthStatus, SnapshotInfo, SnapshotState, TaskStatus,
};
use crate::Result;

/// Decides completion for one operation kind
///
/// `observe` performs the queries; the other methods are pure functions of the
/// observed state so they can be tested without a cluster.
#[async_trait]
pub trait CompletionPredicate: Send + Sync {
    /// What one round of queries yields
    type State: Send;

    /// Query the cluster once
    async fn observe(&self, client: &dyn ClusterClient) -> Result<Self::State>;

    /// Whether the operation has finished
    fn is_done(&self, state: &Self::State) -> bool;

    /// Failure text when the cluster reports the operation as failed
    ///
    /// Checked before [`is_done`](Self::is_done).
    fn failure(&self, _state: &Self::State) -> Option<String> {
        None
    }

    /// One-line progress description
    fn describe(&self, state: &Self::State) -> String;
}

fn describe_shards(health: &ClusterHealth) -> String {
    format!(
        "health {}: {} relocating, {} initializing, {} unassigned shards",
        health.status,
        health.relocating_shards,
        health.initializing_shards,
        health.unassigned_shards
    )
}

/// Done once no shard of the targeted indices is relocating
#[derive(Debug, Clone)]
pub struct AllocationComplete {
    indices: Vec<String>,
}

impl AllocationComplete {
    /// Watch relocation of `indices`
    pub fn new(indices: Vec<String>) -> Self {
        Self { indices }
    }
}

#[async_trait]
impl CompletionPredicate for AllocationComplete {
    type State = ClusterHealth;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<ClusterHealth> {
        client.cluster_health(&self.indices).await
    }

    fn is_done(&self, health: &ClusterHealth) -> bool {
        health.relocating_shards == 0
    }

    fn describe(&self, health: &ClusterHealth) -> String {
        describe_shards(health)
    }
}

/// Done once no shard anywhere in the cluster is relocating
#[derive(Debug, Clone, Default)]
pub struct RoutingComplete;

#[async_trait]
impl CompletionPredicate for RoutingComplete {
    type State = ClusterHealth;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<ClusterHealth> {
        client.cluster_health(&[]).await
    }

    fn is_done(&self, health: &ClusterHealth) -> bool {
        health.relocating_shards == 0
    }

    fn describe(&self, health: &ClusterHealth) -> String {
        describe_shards(health)
    }
}

/// Observed replica state: index-scoped health plus indices whose setting
/// does not yet show the requested count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaState {
    /// Health scoped to the targeted indices
    pub health: ClusterHealth,
    /// Indices whose `number_of_replicas` differs from the requested count
    pub mismatched: Vec<String>,
}

/// Done once every targeted index carries the requested replica count and all
/// its shard copies are allocated
///
/// A red index is never done. If it stays red the session runs into its
/// budget.
#[derive(Debug, Clone)]
pub struct ReplicasSynced {
    indices: Vec<String>,
    count: u32,
}

impl ReplicasSynced {
    /// Watch `indices` converge on `count` replicas
    pub fn new(indices: Vec<String>, count: u32) -> Self {
        Self { indices, count }
    }
}

#[async_trait]
impl CompletionPredicate for ReplicasSynced {
    type State = ReplicaState;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<ReplicaState> {
        let health = client.cluster_health(&self.indices).await?;
        let mut mismatched = Vec::new();
        for index in &self.indices {
            let settings = client.index_settings(index).await?;
            if settings.number_of_replicas != self.count {
                mismatched.push(index.clone());
            }
        }
        Ok(ReplicaState { health, mismatched })
    }

    fn is_done(&self, state: &ReplicaState) -> bool {
        state.mismatched.is_empty()
            && state.health.status != HealthStatus::Red
            && state.health.initializing_shards == 0
            && state.health.unassigned_shards == 0
    }

    fn describe(&self, state: &ReplicaState) -> String {
        let mut text = format!(
            "health {}: {} active, {} initializing, {} unassigned shards",
            state.health.status,
            state.health.active_shards,
            state.health.initializing_shards,
            state.health.unassigned_shards
        );
        if !state.mismatched.is_empty() {
            text.push_str(&format!(
                "; {} of {} indices not yet at {} replicas",
                state.mismatched.len(),
                self.indices.len(),
                self.count
            ));
        }
        text
    }
}

/// Done once the snapshot reaches a terminal state
///
/// `FAILED` and `INCOMPATIBLE` end the session as failed. `PARTIAL` counts as
/// done; the caller decides whether to warn about it.
#[derive(Debug, Clone)]
pub struct SnapshotComplete {
    repository: String,
    name: String,
}

impl SnapshotComplete {
    /// Watch snapshot `name` in `repository`
    pub fn new(repository: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl CompletionPredicate for SnapshotComplete {
    type State = SnapshotInfo;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<SnapshotInfo> {
        client.snapshot_status(&self.repository, &self.name).await
    }

    fn is_done(&self, info: &SnapshotInfo) -> bool {
        info.state.is_terminal()
    }

    fn failure(&self, info: &SnapshotInfo) -> Option<String> {
        match info.state {
            SnapshotState::Failed | SnapshotState::Incompatible => Some(format!(
                "snapshot {} ended in state {}",
                self.name, info.state
            )),
            _ => None,
        }
    }

    fn describe(&self, info: &SnapshotInfo) -> String {
        format!("snapshot {} state {}", self.name, info.state)
    }
}

/// Observed restore state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreState {
    /// Expected indices that exist
    pub found: BTreeSet<String>,
    /// Expected indices that do not exist yet
    pub missing: BTreeSet<String>,
    /// Existing indices whose shards are not all recovered
    pub recovering: BTreeSet<String>,
}

/// Done once every expected index exists and all of its shards report
/// recovery stage `DONE`
#[derive(Debug, Clone)]
pub struct RestoreComplete {
    expected: BTreeSet<String>,
}

impl RestoreComplete {
    /// Watch for `expected` indices to appear and recover
    pub fn new(expected: BTreeSet<String>) -> Self {
        Self { expected }
    }
}

#[async_trait]
impl CompletionPredicate for RestoreComplete {
    type State = RestoreState;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<RestoreState> {
        let existing: BTreeSet<String> = client.list_indices().await?.into_iter().collect();
        let (found, missing): (BTreeSet<String>, BTreeSet<String>) = self
            .expected
            .iter()
            .cloned()
            .partition(|index| existing.contains(index));

        // Recovery is only meaningful once every index has been created.
        let recovering = if missing.is_empty() {
            let names: Vec<String> = found.iter().cloned().collect();
            let mut recovery = BTreeMap::new();
            for chunk in chunk_index_list(&names) {
                recovery.extend(client.index_recovery(&chunk).await?);
            }
            found
                .iter()
                .filter(|index| !recovery.get(*index).is_some_and(|r| r.is_done()))
                .cloned()
                .collect()
        } else {
            BTreeSet::new()
        };

        Ok(RestoreState {
            found,
            missing,
            recovering,
        })
    }

    fn is_done(&self, state: &RestoreState) -> bool {
        state.missing.is_empty() && state.recovering.is_empty()
    }

    fn describe(&self, state: &RestoreState) -> String {
        let mut text = format!(
            "found {} of {} expected indices",
            state.found.len(),
            self.expected.len()
        );
        if !state.recovering.is_empty() {
            text.push_str(&format!(", {} still recovering", state.recovering.len()));
        }
        text
    }
}

/// Done once the reindex task reports completion
///
/// A task error, or failures in the completed response, end the session as
/// failed.
#[derive(Debug, Clone)]
pub struct ReindexComplete {
    task_id: String,
}

impl ReindexComplete {
    /// Watch task `task_id`
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

#[async_trait]
impl CompletionPredicate for ReindexComplete {
    type State = TaskStatus;

    async fn observe(&self, client: &dyn ClusterClient) -> Result<TaskStatus> {
        client.task_status(&self.task_id).await
    }

    fn is_done(&self, status: &TaskStatus) -> bool {
        status.completed
    }

    fn failure(&self, status: &TaskStatus) -> Option<String> {
        if let Some(error) = status.error_text() {
            return Some(error);
        }
        let failures = status.failure_texts();
        if status.completed && !failures.is_empty() {
            return Some(format!(
                "task {} completed with {} failures: {}",
                self.task_id,
                failures.len(),
                failures.join("; ")
            ));
        }
        None
    }

    fn describe(&self, status: &TaskStatus) -> String {
        let secs = status.running_time().as_secs_f64();
        if status.completed {
            format!("task {} completed after {:.1}s", self.task_id, secs)
        } else {
            format!(
                "task {} running for {:.1}s: {}",
                self.task_id, secs, status.task.description
            )
        }
    }
}
