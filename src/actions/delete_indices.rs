//! Index deletion with residual retry

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use super::{chunk_index_list, ensure_indices, log_dry_run, ClusterAction};
use crate::client::ClusterClient;
use crate::retry::{retry_residual, DELETE_ATTEMPTS};
use crate::{Error, Result};

/// Deletes the selected indices
///
/// After each bulk delete the index list is re-read and only the indices
/// still present are retried, up to three attempts per chunk.
pub struct DeleteIndices {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    master_timeout: Option<Duration>,
}

impl DeleteIndices {
    /// Delete `indices` with the client's configured master timeout
    pub fn new(client: Arc<dyn ClusterClient>, indices: Vec<String>) -> Self {
        Self {
            client,
            indices,
            master_timeout: None,
        }
    }

    /// Seconds to wait for the master node to acknowledge each delete
    pub fn with_master_timeout(mut self, secs: u64) -> Self {
        self.master_timeout = Some(Duration::from_secs(secs));
        self
    }

    async fn delete_and_verify(&self, pending: Vec<String>) -> Result<Vec<String>> {
        for index in &pending {
            info!(index = %index, "Deleting index");
        }
        self.client
            .delete_indices(&pending, self.master_timeout)
            .await?;
        let existing: BTreeSet<String> = self.client.list_indices().await?.into_iter().collect();
        Ok(pending
            .into_iter()
            .filter(|index| existing.contains(index))
            .collect())
    }
}

#[async_trait]
impl ClusterAction for DeleteIndices {
    fn name(&self) -> &'static str {
        "delete_indices"
    }

    fn do_dry_run(&self) {
        log_dry_run(self.name(), &self.indices, "");
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        info!(indices = self.indices.len(), "Deleting selected indices");

        let mut undeleted = Vec::new();
        for chunk in chunk_index_list(&self.indices) {
            let outcome = retry_residual(self.name(), DELETE_ATTEMPTS, chunk, |pending| {
                self.delete_and_verify(pending)
            })
            .await?;
            undeleted.extend(outcome.remaining);
        }

        if !undeleted.is_empty() {
            error!(
                indices = ?undeleted,
                attempts = DELETE_ATTEMPTS,
                "Unable to delete indices"
            );
            return Err(Error::failed_execution(format!(
                "unable to delete {} indices after {} attempts: {}",
                undeleted.len(),
                DELETE_ATTEMPTS,
                undeleted.join(",")
            )));
        }
        Ok(())
    }
}
