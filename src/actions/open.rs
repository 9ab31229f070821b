//! Index opening

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{chunk_index_list, ensure_indices, log_dry_run, ClusterAction};
use crate::client::ClusterClient;
use crate::Result;

/// Opens the selected closed indices
pub struct Open {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
}

impl Open {
    /// Open `indices`
    pub fn new(client: Arc<dyn ClusterClient>, indices: Vec<String>) -> Self {
        Self { client, indices }
    }
}

#[async_trait]
impl ClusterAction for Open {
    fn name(&self) -> &'static str {
        "open"
    }

    fn do_dry_run(&self) {
        log_dry_run(self.name(), &self.indices, "");
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        info!(indices = ?self.indices, "Opening selected indices");
        for chunk in chunk_index_list(&self.indices) {
            self.client.open_indices(&chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::actions::MAX_CSV_LEN;
    use crate::client::MockClusterClient;

    #[tokio::test]
    async fn long_selection_is_opened_in_chunks() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let mut mock = MockClusterClient::new();
        mock.expect_open_indices()
            .times(3)
            .returning(move |chunk| {
                assert!(chunk.join(",").len() <= MAX_CSV_LEN);
                counter.fetch_add(chunk.len(), Ordering::SeqCst);
                Ok(())
            });

        // 33-byte names: 90 fit under the limit, so 200 need three requests
        let indices: Vec<String> = (0..200)
            .map(|i| format!("logs-2024.01.{:020}", i))
            .collect();
        Open::new(Arc::new(mock), indices).do_action().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 200);
    }
}
