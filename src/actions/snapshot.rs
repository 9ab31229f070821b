//! Snapshot creation

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ensure_indices, parse_date_pattern, wait_on, ClusterAction};
use crate::client::{ClusterClient, SnapshotState};
use crate::config::{WaitOptions, DEFAULT_WAIT_INTERVAL_SECS};
use crate::wait::WaitTarget;
use crate::{Error, Result};

/// Snapshot request flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotOptions {
    /// Skip missing or closed indices instead of failing
    pub ignore_unavailable: bool,
    /// Store the cluster global state with the snapshot
    pub include_global_state: bool,
    /// Allow a snapshot of indices with unavailable primaries
    pub partial: bool,
    /// Skip verifying repository access on every node first
    pub skip_repo_fs_check: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            ignore_unavailable: false,
            include_global_state: true,
            partial: false,
            skip_repo_fs_check: false,
        }
    }
}

/// Whether any snapshot in `repository` is still running
pub(crate) async fn snapshot_running(client: &dyn ClusterClient, repository: &str) -> Result<bool> {
    Ok(client
        .list_snapshots(repository)
        .await?
        .iter()
        .any(|s| s.state == SnapshotState::InProgress))
}

/// Checks shared by snapshot and restore before they start
pub(crate) async fn prepare_repository(
    client: &dyn ClusterClient,
    repository: &str,
    skip_repo_fs_check: bool,
) -> Result<()> {
    if !client.repository_exists(repository).await? {
        return Err(Error::not_found(format!("repository {}", repository)));
    }
    if !skip_repo_fs_check {
        client.verify_repository(repository).await?;
    }
    if snapshot_running(client, repository).await? {
        return Err(Error::SnapshotInProgress(format!(
            "a snapshot is already running in repository {}",
            repository
        )));
    }
    Ok(())
}

/// Snapshots the selected indices into a repository
pub struct Snapshot {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    repository: String,
    name: String,
    options: SnapshotOptions,
    wait: WaitOptions,
}

impl Snapshot {
    /// `name` may contain strftime escapes, expanded once here.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        indices: Vec<String>,
        repository: &str,
        name: &str,
        options: SnapshotOptions,
    ) -> Result<Self> {
        if repository.is_empty() {
            return Err(Error::missing_argument("no value for \"repository\" provided"));
        }
        if name.is_empty() {
            return Err(Error::missing_argument("no value for \"name\" provided"));
        }
        Ok(Self {
            client,
            indices,
            repository: repository.to_string(),
            name: parse_date_pattern(name)?,
            options,
            wait: WaitOptions::waiting(DEFAULT_WAIT_INTERVAL_SECS),
        })
    }

    /// Override the default wait (enabled, 9s interval, no limit)
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Snapshot name after date expansion
    pub fn snapshot_name(&self) -> &str {
        &self.name
    }

    /// Create-snapshot request body
    pub fn body(&self) -> Value {
        json!({
            "indices": self.indices.join(","),
            "ignore_unavailable": self.options.ignore_unavailable,
            "include_global_state": self.options.include_global_state,
            "partial": self.options.partial,
        })
    }

    async fn report_state(&self) -> Result<SnapshotState> {
        let info = self
            .client
            .snapshot_status(&self.repository, &self.name)
            .await?;
        if info.state == SnapshotState::Success {
            info!(snapshot = %self.name, "Snapshot successfully completed");
        } else {
            warn!(
                snapshot = %self.name,
                state = %info.state,
                "Snapshot completed with non-success state"
            );
        }
        Ok(info.state)
    }
}

#[async_trait]
impl ClusterAction for Snapshot {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(
            snapshot = %self.name,
            repository = %self.repository,
            body = %self.body(),
            "DRY-RUN: would create snapshot"
        );
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        prepare_repository(
            self.client.as_ref(),
            &self.repository,
            self.options.skip_repo_fs_check,
        )
        .await?;

        info!(
            snapshot = %self.name,
            repository = %self.repository,
            indices = self.indices.len(),
            "Creating snapshot"
        );
        self.client
            .create_snapshot(&self.repository, &self.name, &self.body())
            .await?;

        if !self.wait.wait_for_completion {
            warn!(
                snapshot = %self.name,
                "Not waiting for completion; check the snapshot state manually"
            );
            return Ok(());
        }

        let target = WaitTarget::Snapshot {
            repository: self.repository.clone(),
            name: self.name.clone(),
        };
        wait_on(self.client.as_ref(), target, &self.wait)
            .await?
            .into_result()?;
        self.report_state().await?;
        Ok(())
    }
}
