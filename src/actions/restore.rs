//! Snapshot restore

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::snapshot::prepare_repository;
use super::{wait_on, ClusterAction};
use crate::client::{ClusterClient, SnapshotInfo, SnapshotState};
use crate::config::{WaitOptions, DEFAULT_WAIT_INTERVAL_SECS};
use crate::wait::{PollOutcome, WaitTarget};
use crate::{Error, Result};

/// Restore request options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    /// Indices to restore; all indices in the snapshot when unset
    pub indices: Option<Vec<String>>,
    /// Restore aliases along with the indices
    pub include_aliases: bool,
    /// Skip missing indices instead of failing
    pub ignore_unavailable: bool,
    /// Restore the cluster global state
    pub include_global_state: bool,
    /// Allow restoring a PARTIAL snapshot
    pub partial: bool,
    /// Regex with captures matched against each restored index name
    pub rename_pattern: Option<String>,
    /// Target name with `$1`-style references to the pattern's captures
    pub rename_replacement: Option<String>,
    /// Extra keys merged into the request body, e.g. `index_settings`
    pub extra_settings: Option<Map<String, Value>>,
    /// Skip verifying repository access on every node first
    pub skip_repo_fs_check: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            indices: None,
            include_aliases: false,
            ignore_unavailable: false,
            include_global_state: true,
            partial: false,
            rename_pattern: None,
            rename_replacement: None,
            extra_settings: None,
            skip_repo_fs_check: false,
        }
    }
}

/// What a restore produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Outcome of the wait, `None` when not waiting
    ///
    /// Never `Failed`: a failed wait is returned as an error instead.
    pub outcome: Option<PollOutcome>,
    /// Expected indices present after the wait
    pub found: Vec<String>,
    /// Expected indices absent after the wait
    pub missing: Vec<String>,
}

impl RestoreReport {
    /// Every expected index is present
    pub fn all_restored(&self) -> bool {
        self.missing.is_empty()
    }

    /// Some but not all expected indices are present
    pub fn is_partial(&self) -> bool {
        !self.found.is_empty() && !self.missing.is_empty()
    }
}

/// Rewrite `$1`-style group references into the `${1}` form, so a reference
/// followed by a letter or digit is not read as a longer group name.
fn to_regex_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            out.push_str("${");
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                out.push(d);
                chars.next();
            }
            out.push('}');
        } else {
            out.push(c);
        }
    }
    out
}

/// Restores indices from a snapshot, optionally renaming them
pub struct Restore {
    client: Arc<dyn ClusterClient>,
    repository: String,
    snapshot: String,
    indices: Vec<String>,
    expected: Vec<String>,
    body: Value,
    skip_repo_fs_check: bool,
    wait: WaitOptions,
}

impl Restore {
    /// Restore snapshot `name` from `snapshots` (the repository listing), or
    /// the most recent one when `name` is `None`
    pub fn new(
        client: Arc<dyn ClusterClient>,
        repository: &str,
        snapshots: &[SnapshotInfo],
        name: Option<&str>,
        options: RestoreOptions,
    ) -> Result<Self> {
        if repository.is_empty() {
            return Err(Error::missing_argument("no value for \"repository\" provided"));
        }
        let snapshot = match name {
            Some(name) => snapshots.iter().find(|s| s.name == name),
            None => snapshots.iter().max_by_key(|s| s.start_time_in_millis),
        }
        .ok_or_else(|| {
            Error::not_found(format!(
                "snapshot {} in repository {}",
                name.unwrap_or("(most recent)"),
                repository
            ))
        })?;

        match snapshot.state {
            SnapshotState::Success => {}
            SnapshotState::Partial if options.partial => {
                warn!(snapshot = %snapshot.name, "Performing restore of snapshot in state PARTIAL");
            }
            ref other => {
                return Err(Error::failed_execution(format!(
                    "snapshot {} is in state {}; restore needs SUCCESS, or PARTIAL with partial=true",
                    snapshot.name, other
                )))
            }
        }

        let indices = options
            .indices
            .clone()
            .unwrap_or_else(|| snapshot.indices.clone());

        // A pattern without a replacement is ignored.
        let (pattern, replacement) = match options.rename_replacement.as_deref() {
            Some(replacement) => (
                options.rename_pattern.clone().unwrap_or_default(),
                replacement.to_string(),
            ),
            None => (String::new(), String::new()),
        };
        let expected = if pattern.is_empty() && replacement.is_empty() {
            indices.clone()
        } else {
            let regex = Regex::new(&pattern).map_err(|e| {
                Error::configuration(format!("invalid rename_pattern '{}': {}", pattern, e))
            })?;
            let rewritten = to_regex_replacement(&replacement);
            indices
                .iter()
                .map(|index| {
                    let renamed = regex.replace_all(index, rewritten.as_str()).into_owned();
                    debug!(index = %index, replacement = %renamed, "Computed restored index name");
                    renamed
                })
                .collect()
        };

        let mut body = json!({
            "indices": indices,
            "include_aliases": options.include_aliases,
            "ignore_unavailable": options.ignore_unavailable,
            "include_global_state": options.include_global_state,
            "partial": options.partial,
            "rename_pattern": pattern,
            "rename_replacement": replacement,
        });
        if let (Some(extra), Some(map)) = (&options.extra_settings, body.as_object_mut()) {
            debug!(extra = ?extra, "Adding extra settings to restore body");
            for (key, value) in extra {
                map.insert(key.clone(), value.clone());
            }
        }

        Ok(Self {
            client,
            repository: repository.to_string(),
            snapshot: snapshot.name.clone(),
            indices,
            expected,
            body,
            skip_repo_fs_check: options.skip_repo_fs_check,
            wait: WaitOptions::waiting(DEFAULT_WAIT_INTERVAL_SECS),
        })
    }

    /// Override the default wait (enabled, 9s interval, no limit)
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Snapshot being restored
    pub fn snapshot_name(&self) -> &str {
        &self.snapshot
    }

    /// Index names the restore should produce
    pub fn expected_indices(&self) -> &[String] {
        &self.expected
    }

    /// Restore request body
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Start the restore, wait if configured, and report what was found
    pub async fn run(&self) -> Result<RestoreReport> {
        prepare_repository(self.client.as_ref(), &self.repository, self.skip_repo_fs_check).await?;

        info!(
            snapshot = %self.snapshot,
            repository = %self.repository,
            indices = ?self.indices,
            "Restoring indices from snapshot"
        );
        self.client
            .restore_snapshot(&self.repository, &self.snapshot, &self.body)
            .await?;

        if !self.wait.wait_for_completion {
            warn!(
                snapshot = %self.snapshot,
                "Not waiting for completion; check the restored indices manually"
            );
            return Ok(RestoreReport {
                outcome: None,
                found: Vec::new(),
                missing: Vec::new(),
            });
        }

        let target = WaitTarget::Restore {
            indices: self.expected.iter().cloned().collect::<BTreeSet<_>>(),
        };
        let report = wait_on(self.client.as_ref(), target, &self.wait).await?;
        let outcome = report.outcome.clone();
        if let PollOutcome::Failed(_) = outcome {
            report.into_result()?;
        }
        let (found, missing) = self.report_state().await?;
        Ok(RestoreReport {
            outcome: Some(outcome),
            found,
            missing,
        })
    }

    async fn report_state(&self) -> Result<(Vec<String>, Vec<String>)> {
        let existing: BTreeSet<String> = self.client.list_indices().await?.into_iter().collect();
        let (found, missing): (Vec<String>, Vec<String>) = self
            .expected
            .iter()
            .cloned()
            .partition(|index| existing.contains(index));
        for index in &found {
            info!(index = %index, "Found restored index");
        }
        if missing.is_empty() {
            info!("All indices appear to have been restored");
        } else {
            error!(missing = ?missing, "Some of the indices do not appear to have been restored");
        }
        Ok((found, missing))
    }
}

#[async_trait]
impl ClusterAction for Restore {
    fn name(&self) -> &'static str {
        "restore"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(
            snapshot = %self.snapshot,
            repository = %self.repository,
            body = %self.body,
            "DRY-RUN: would restore snapshot"
        );
        for (index, renamed) in self.indices.iter().zip(&self.expected) {
            if index == renamed {
                info!(index = %index, "DRY-RUN: restore index");
            } else {
                info!(index = %index, renamed = %renamed, "DRY-RUN: restore index under new name");
            }
        }
    }

    /// A restore that times out with some indices present is a warning; one
    /// that produced none of them is an error.
    async fn do_action(&self) -> Result<()> {
        let report = self.run().await?;
        match report.outcome {
            Some(PollOutcome::TimedOut) if report.found.is_empty() => {
                Err(Error::failed_execution(format!(
                    "none of the {} expected indices were restored from snapshot {}",
                    self.expected.len(),
                    self.snapshot
                )))
            }
            Some(PollOutcome::TimedOut) => {
                warn!(
                    snapshot = %self.snapshot,
                    found = report.found.len(),
                    missing = ?report.missing,
                    "Restore did not finish within max_wait; it may still be running"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
