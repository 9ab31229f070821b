//! Snapshot deletion

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::snapshot::snapshot_running;
use super::ClusterAction;
use crate::client::ClusterClient;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

/// Default pause between checks for a running snapshot
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(120);

/// Default number of checks for a running snapshot
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Deletes the selected snapshots once the repository is idle
pub struct DeleteSnapshots {
    client: Arc<dyn ClusterClient>,
    repository: String,
    snapshots: Vec<String>,
    retry: RetryConfig,
}

impl DeleteSnapshots {
    /// Delete `snapshots` from `repository`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        repository: &str,
        snapshots: Vec<String>,
    ) -> Result<Self> {
        if repository.is_empty() {
            return Err(Error::missing_argument("no value for \"repository\" provided"));
        }
        Ok(Self {
            client,
            repository: repository.to_string(),
            snapshots,
            retry: RetryConfig::fixed(DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_COUNT),
        })
    }

    /// How often, and how many times, to check for a running snapshot
    ///
    /// `count` must be at least 1.
    pub fn with_retry(mut self, interval: Duration, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::configuration("\"retry_count\" must be at least 1"));
        }
        self.retry = RetryConfig::fixed(interval, count);
        Ok(self)
    }

    async fn ensure_idle(&self) -> Result<()> {
        if snapshot_running(self.client.as_ref(), &self.repository).await? {
            return Err(Error::SnapshotInProgress(format!(
                "repository {} has a running snapshot",
                self.repository
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterAction for DeleteSnapshots {
    fn name(&self) -> &'static str {
        "delete_snapshots"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        for snapshot in &self.snapshots {
            info!(
                snapshot = %snapshot,
                repository = %self.repository,
                retry_interval_secs = self.retry.initial_delay.as_secs(),
                retry_count = self.retry.max_attempts,
                "DRY-RUN: would delete snapshot"
            );
        }
    }

    async fn do_action(&self) -> Result<()> {
        if self.snapshots.is_empty() {
            return Err(Error::NoSnapshots(format!(
                "no snapshots selected in repository {}",
                self.repository
            )));
        }
        info!(count = self.snapshots.len(), "Deleting selected snapshots");

        retry_with_backoff(&self.retry, "wait_for_idle_repository", || self.ensure_idle())
            .await
            .map_err(|e| match e {
                Error::SnapshotInProgress(_) => Error::failed_execution(
                    "unable to delete snapshots because a snapshot is in state IN_PROGRESS",
                ),
                other => other,
            })?;

        for snapshot in &self.snapshots {
            info!(snapshot = %snapshot, "Deleting snapshot");
            self.client
                .delete_snapshot(&self.repository, snapshot)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::client::{MockClusterClient, SnapshotInfo, SnapshotState};

    fn snaps() -> Vec<String> {
        vec!["s1".to_string(), "s2".to_string()]
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let action = DeleteSnapshots::new(Arc::new(MockClusterClient::new()), "backups", vec![]).unwrap();
        assert!(matches!(action.do_action().await, Err(Error::NoSnapshots(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_running_snapshot_then_deletes() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = checks.clone();
        let mut mock = MockClusterClient::new();
        mock.expect_list_snapshots().returning(move |_| {
            let state = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                SnapshotState::InProgress
            } else {
                SnapshotState::Success
            };
            Ok(vec![SnapshotInfo::new("running", state)])
        });
        mock.expect_delete_snapshot().times(2).returning(|_, _| Ok(()));

        let start = tokio::time::Instant::now();
        DeleteSnapshots::new(Arc::new(mock), "backups", snaps())
            .unwrap()
            .do_action()
            .await
            .unwrap();

        assert_eq!(checks.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), DEFAULT_RETRY_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_running_snapshot_fails_without_deleting() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_snapshots()
            .returning(|_| Ok(vec![SnapshotInfo::new("running", SnapshotState::InProgress)]));
        mock.expect_delete_snapshot().never();

        let err = DeleteSnapshots::new(Arc::new(mock), "backups", snaps())
            .unwrap()
            .with_retry(Duration::from_secs(10), 2)
            .unwrap()
            .do_action()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedExecution(_)));
    }

    #[test]
    fn zero_retry_count_is_rejected() {
        let result = DeleteSnapshots::new(Arc::new(MockClusterClient::new()), "backups", snaps())
            .unwrap()
            .with_retry(Duration::from_secs(10), 0);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn single_retry_checks_once_then_gives_up() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = checks.clone();
        let mut mock = MockClusterClient::new();
        mock.expect_list_snapshots().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SnapshotInfo::new("running", SnapshotState::InProgress)])
        });
        mock.expect_delete_snapshot().never();

        let err = DeleteSnapshots::new(Arc::new(mock), "backups", snaps())
            .unwrap()
            .with_retry(Duration::from_secs(10), 1)
            .unwrap()
            .do_action()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::FailedExecution(_)));
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }
}
