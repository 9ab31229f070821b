//! Segment merging

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_indices, log_dry_run, ClusterAction};
use crate::client::ClusterClient;
use crate::{Error, Result};

/// Merges each selected index down to a segment count, one index at a time
pub struct ForceMerge {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    max_num_segments: u32,
    delay: Duration,
}

impl ForceMerge {
    /// Merge `indices` to at most `max_num_segments` segments per shard
    pub fn new(
        client: Arc<dyn ClusterClient>,
        indices: Vec<String>,
        max_num_segments: u32,
    ) -> Result<Self> {
        if max_num_segments == 0 {
            return Err(Error::missing_argument(
                "missing value for \"max_num_segments\"",
            ));
        }
        Ok(Self {
            client,
            indices,
            max_num_segments,
            delay: Duration::ZERO,
        })
    }

    /// Pause between consecutive merges
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ClusterAction for ForceMerge {
    fn name(&self) -> &'static str {
        "forcemerge"
    }

    fn do_dry_run(&self) {
        log_dry_run(
            self.name(),
            &self.indices,
            &format!(
                "max_num_segments={} delay={}s",
                self.max_num_segments,
                self.delay.as_secs()
            ),
        );
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;

        for (i, index) in self.indices.iter().enumerate() {
            info!(
                index = %index,
                max_num_segments = self.max_num_segments,
                "forceMerging index"
            );
            self.client.forcemerge(index, self.max_num_segments).await?;
            if !self.delay.is_zero() && i + 1 < self.indices.len() {
                info!(delay_secs = self.delay.as_secs(), "Pausing before next merge");
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(())
    }
}
