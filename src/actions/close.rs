//! Index closing

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{chunk_index_list, ensure_indices, log_dry_run, ClusterAction};
use crate::client::ClusterClient;
use crate::Result;

/// Flushes and closes the selected indices, optionally dropping their
/// aliases first
pub struct Close {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    delete_aliases: bool,
}

impl Close {
    /// Close `indices`
    pub fn new(client: Arc<dyn ClusterClient>, indices: Vec<String>) -> Self {
        Self {
            client,
            indices,
            delete_aliases: false,
        }
    }

    /// Remove every alias from the indices before closing them
    pub fn with_delete_aliases(mut self, delete_aliases: bool) -> Self {
        self.delete_aliases = delete_aliases;
        self
    }
}

#[async_trait]
impl ClusterAction for Close {
    fn name(&self) -> &'static str {
        "close"
    }

    fn do_dry_run(&self) {
        log_dry_run(
            self.name(),
            &self.indices,
            &format!("delete_aliases={}", self.delete_aliases),
        );
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        info!(indices = ?self.indices, "Closing selected indices");

        for chunk in chunk_index_list(&self.indices) {
            if self.delete_aliases {
                debug!(indices = ?chunk, "Deleting aliases before closing");
                // Indices without aliases make this fail; closing goes ahead.
                if let Err(e) = self.client.delete_aliases(&chunk).await {
                    warn!(error = %e, "Some indices may not have had aliases");
                }
            }
            self.client.flush_indices(&chunk).await?;
            self.client.close_indices(&chunk).await?;
        }
        Ok(())
    }
}
