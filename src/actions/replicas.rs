//! Replica count changes

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{chunk_index_list, ensure_indices, log_dry_run, wait_on, ClusterAction};
use crate::client::ClusterClient;
use crate::config::{WaitOptions, DEFAULT_WAIT_INTERVAL_SECS};
use crate::wait::WaitTarget;
use crate::Result;

/// Sets `number_of_replicas` on the selected indices
///
/// Waiting only happens for a non-zero count; dropping replicas needs no
/// allocation.
pub struct Replicas {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    count: u32,
    wait: WaitOptions,
}

impl Replicas {
    /// Replica count change for `indices`
    pub fn new(client: Arc<dyn ClusterClient>, indices: Vec<String>, count: u32) -> Self {
        Self {
            client,
            indices,
            count,
            wait: WaitOptions::no_wait(DEFAULT_WAIT_INTERVAL_SECS),
        }
    }

    /// Wait for replicas to be allocated after each chunk
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    fn body(&self) -> Value {
        json!({ "number_of_replicas": self.count })
    }
}

#[async_trait]
impl ClusterAction for Replicas {
    fn name(&self) -> &'static str {
        "replicas"
    }

    fn do_dry_run(&self) {
        log_dry_run(self.name(), &self.indices, &format!("count={}", self.count));
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        info!(count = self.count, indices = self.indices.len(), "Setting replica count");

        let body = self.body();
        for chunk in chunk_index_list(&self.indices) {
            self.client.put_index_settings(&chunk, &body).await?;
            if self.wait.wait_for_completion && self.count > 0 {
                debug!(indices = chunk.len(), "Waiting for shards to complete replication");
                let target = WaitTarget::Replicas {
                    indices: chunk,
                    count: self.count,
                };
                wait_on(self.client.as_ref(), target, &self.wait)
                    .await?
                    .into_result()?;
            }
        }
        Ok(())
    }
}
