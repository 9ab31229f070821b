//! Reindex into a destination index

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{wait_on, ClusterAction};
use crate::client::{ClusterClient, ReindexParams};
use crate::config::{WaitOptions, DEFAULT_WAIT_INTERVAL_SECS};
use crate::wait::WaitTarget;
use crate::{Error, Result};

/// Source index placeholder replaced by the selected indices
pub const REINDEX_SELECTION: &str = "REINDEX_SELECTION";

/// Submits a reindex task and optionally waits for it
///
/// The request body is passed through as given, except that a
/// `source.index` of [`REINDEX_SELECTION`] is replaced with the selection.
pub struct Reindex {
    client: Arc<dyn ClusterClient>,
    body: Value,
    dest: String,
    remote: Option<String>,
    uses_selection: bool,
    params: ReindexParams,
    wait: WaitOptions,
}

impl Reindex {
    /// Validate `body` and substitute the selection
    pub fn new(
        client: Arc<dyn ClusterClient>,
        indices: Vec<String>,
        mut body: Value,
        params: ReindexParams,
    ) -> Result<Self> {
        if !body.is_object() {
            return Err(Error::configuration("\"request_body\" must be an object"));
        }
        let dest = body
            .pointer("/dest/index")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::configuration("request_body is missing dest.index"))?
            .to_string();
        let source = body
            .get_mut("source")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::configuration("request_body is missing source"))?;

        let remote = match source.get("remote") {
            Some(remote) => {
                let host = remote
                    .get("host")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::configuration("missing remote \"host\""))?;
                let (host, port) = parse_remote_host(host)?;
                debug!(host = %host, port, "Remote reindex request detected");
                Some(format!("{}:{}", host, port))
            }
            None => None,
        };

        let uses_selection = source.get("index").and_then(Value::as_str) == Some(REINDEX_SELECTION);
        if uses_selection {
            if remote.is_some() {
                return Err(Error::configuration(
                    "REINDEX_SELECTION cannot be used with a remote source",
                ));
            }
            source.insert("index".to_string(), Value::from(indices));
        } else if !source.contains_key("index") {
            return Err(Error::configuration("request_body is missing source.index"));
        }
        debug!(body = %body, "Reindex request body");

        Ok(Self {
            client,
            body,
            dest,
            remote,
            uses_selection,
            params,
            wait: WaitOptions::waiting(DEFAULT_WAIT_INTERVAL_SECS),
        })
    }

    /// Override the default wait (enabled, 9s interval, no limit)
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Request body after substitution
    pub fn body(&self) -> &Value {
        &self.body
    }

    fn run_args(&self) -> String {
        format!(
            "refresh={} requests_per_second={} slices={} timeout={}s wait_for_active_shards={} wait_for_completion={}",
            self.params.refresh,
            self.params
                .requests_per_second
                .map_or_else(|| "-1".to_string(), |r| r.to_string()),
            self.params.slices,
            self.params.timeout.as_secs(),
            self.params.wait_for_active_shards,
            self.wait.wait_for_completion
        )
    }

    /// Submit the task, wait if configured, and return the task id
    pub async fn run(&self) -> Result<String> {
        if self.uses_selection
            && self
                .body
                .pointer("/source/index")
                .and_then(Value::as_array)
                .is_some_and(|a| a.is_empty())
        {
            return Err(Error::no_indices("reindex: no indices selected"));
        }

        match &self.remote {
            Some(remote) => info!(
                remote = %remote,
                dest = %self.dest,
                args = %self.run_args(),
                "Commencing remote reindex operation"
            ),
            None => info!(dest = %self.dest, args = %self.run_args(), "Commencing reindex operation"),
        }
        let task_id = self.client.reindex(&self.body, &self.params).await?;
        debug!(task_id = %task_id, "Reindex task submitted");

        if !self.wait.wait_for_completion {
            warn!(
                task_id = %task_id,
                "Not waiting for completion; check the task for success manually"
            );
            return Ok(task_id);
        }

        let target = WaitTarget::Reindex {
            task_id: task_id.clone(),
        };
        wait_on(self.client.as_ref(), target, &self.wait)
            .await?
            .into_result()?;

        if !self.client.list_indices().await?.contains(&self.dest) {
            error!(dest = %self.dest, "Destination index not found after reindex");
            return Err(Error::failed_execution(format!(
                "reindex failed: index \"{}\" not found",
                self.dest
            )));
        }
        Ok(task_id)
    }
}

/// Split a remote `scheme://host:port` into host and port
///
/// Only `http` and `https` are accepted, and the port must be explicit.
fn parse_remote_host(url: &str) -> Result<(String, u16)> {
    let malformed = || {
        Error::configuration(format!(
            "host must be in the form [scheme]://[host]:[port] but was [{}]",
            url
        ))
    };
    let (scheme, rest) = url.split_once("://").ok_or_else(malformed)?;
    if scheme != "http" && scheme != "https" {
        return Err(Error::configuration(format!(
            "host must be an http or https URL, got [{}]",
            url
        )));
    }
    let (host, port) = rest
        .trim_end_matches('/')
        .rsplit_once(':')
        .ok_or_else(malformed)?;
    if host.is_empty() || host.contains('/') {
        return Err(malformed());
    }
    let port = port.parse::<u16>().map_err(|_| malformed())?;
    Ok((host.to_string(), port))
}

#[async_trait]
impl ClusterAction for Reindex {
    fn name(&self) -> &'static str {
        "reindex"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(body = %self.body, args = %self.run_args(), "DRY-RUN: would reindex");
    }

    async fn do_action(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }
}
