//! Lifecycle actions over selected indices and snapshots
//!
//! Each action validates its arguments at construction, issues its mutating
//! request once, and then optionally hands over to [`PollLoop`] to wait for
//! the cluster to finish. Index selections arrive already filtered; an empty
//! selection is rejected with [`Error::NoIndices`] when the action runs.
//!
//! Long index lists are split with [`chunk_index_list`] so request URLs stay
//! bounded. Every chunk gets its own fresh [`PollRequest`] and budget.

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::client::ClusterClient;
use crate::config::WaitOptions;
use crate::wait::{PollLoop, PollReport, PollRequest, WaitTarget};
use crate::{Error, Result};

mod alias;
mod allocation;
mod close;
mod cluster_routing;
mod create_index;
mod delete_indices;
mod delete_snapshots;
mod forcemerge;
mod open;
mod reindex;
mod replicas;
mod restore;
mod rollover;
mod snapshot;

pub use alias::Alias;
pub use allocation::{Allocation, AllocationType};
pub use close::Close;
pub use cluster_routing::{ClusterRouting, RoutingType};
pub use create_index::CreateIndex;
pub use delete_indices::DeleteIndices;
pub use delete_snapshots::DeleteSnapshots;
pub use forcemerge::ForceMerge;
pub use open::Open;
pub use reindex::{Reindex, REINDEX_SELECTION};
pub use replicas::Replicas;
pub use restore::{Restore, RestoreOptions, RestoreReport};
pub use rollover::Rollover;
pub use snapshot::{Snapshot, SnapshotOptions};

/// Longest comma-joined index list sent in a single request
pub const MAX_CSV_LEN: usize = 3072;

/// A lifecycle action that can be previewed or executed
#[async_trait]
pub trait ClusterAction: Send + Sync {
    /// Short action name used in logs
    fn name(&self) -> &'static str;

    /// Log what the action would do without touching the cluster
    fn do_dry_run(&self);

    /// Perform the action, waiting for completion when configured to
    async fn do_action(&self) -> Result<()>;
}

/// Split `indices` into groups whose comma-joined form stays within
/// [`MAX_CSV_LEN`] bytes
///
/// An index name that alone exceeds the limit forms its own group.
pub fn chunk_index_list(indices: &[String]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for index in indices {
        if !current.is_empty() && current_len + 1 + index.len() > MAX_CSV_LEN {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += if current.is_empty() {
            index.len()
        } else {
            index.len() + 1
        };
        current.push(index.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Expand strftime escapes in `name` against the current UTC time
pub fn parse_date_pattern(name: &str) -> Result<String> {
    parse_date_pattern_at(name, Utc::now())
}

/// Expand strftime escapes in `name` against `now`
///
/// Names without `%` are returned unchanged. Unknown escapes are rejected.
pub fn parse_date_pattern_at(name: &str, now: DateTime<Utc>) -> Result<String> {
    if name.is_empty() {
        return Err(Error::missing_argument("name is empty"));
    }
    if !name.contains('%') {
        return Ok(name.to_string());
    }
    let items: Vec<Item<'_>> = StrftimeItems::new(name).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::configuration(format!(
            "invalid date pattern in '{}'",
            name
        )));
    }
    Ok(now.format_with_items(items.into_iter()).to_string())
}

pub(crate) fn ensure_indices(action: &str, indices: &[String]) -> Result<()> {
    if indices.is_empty() {
        return Err(Error::no_indices(format!(
            "{}: no indices selected",
            action
        )));
    }
    Ok(())
}

pub(crate) fn log_dry_run(action: &str, indices: &[String], args: &str) {
    info!("DRY-RUN MODE. No changes will be made.");
    for index in indices {
        info!(action, index = %index, args, "DRY-RUN: would act on index");
    }
}

/// Run one polling session for `target` with the caller's wait options
pub(crate) async fn wait_on(
    client: &dyn ClusterClient,
    target: WaitTarget,
    options: &WaitOptions,
) -> Result<PollReport> {
    let request = PollRequest::from_options(target, options)?;
    Ok(PollLoop::new(client).run_poll(request).await)
}
