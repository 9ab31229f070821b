//! Shard allocation filtering by node attribute

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{chunk_index_list, ensure_indices, log_dry_run, wait_on, ClusterAction};
use crate::client::ClusterClient;
use crate::config::{WaitOptions, DEFAULT_ALLOCATION_WAIT_INTERVAL_SECS};
use crate::wait::WaitTarget;
use crate::{Error, Result};

/// Which allocation filter the attribute is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationType {
    /// Shards must be on nodes carrying the attribute
    #[default]
    Require,
    /// Shards may be on nodes carrying the attribute
    Include,
    /// Shards must not be on nodes carrying the attribute
    Exclude,
}

impl AllocationType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }
}

impl fmt::Display for AllocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "require" => Ok(Self::Require),
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            other => Err(Error::configuration(format!(
                "{} is an invalid allocation_type; must be one of require, include, exclude",
                other
            ))),
        }
    }
}

/// Sets `index.routing.allocation.<type>.<key>` on the selected indices
pub struct Allocation {
    client: Arc<dyn ClusterClient>,
    indices: Vec<String>,
    setting: String,
    value: Option<String>,
    wait: WaitOptions,
}

impl Allocation {
    /// A `None` value removes the setting.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        indices: Vec<String>,
        key: &str,
        value: Option<String>,
        allocation_type: AllocationType,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::missing_argument("no value for \"key\" provided"));
        }
        Ok(Self {
            client,
            indices,
            setting: format!("index.routing.allocation.{}.{}", allocation_type, key),
            value,
            wait: WaitOptions::no_wait(DEFAULT_ALLOCATION_WAIT_INTERVAL_SECS),
        })
    }

    /// Wait for relocation to finish after each chunk
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Settings body sent to every chunk
    pub fn body(&self) -> Value {
        json!({ &self.setting: self.value })
    }
}

#[async_trait]
impl ClusterAction for Allocation {
    fn name(&self) -> &'static str {
        "allocation"
    }

    fn do_dry_run(&self) {
        log_dry_run(self.name(), &self.indices, &self.body().to_string());
    }

    async fn do_action(&self) -> Result<()> {
        ensure_indices(self.name(), &self.indices)?;
        let body = self.body();
        info!(setting = %self.setting, value = ?self.value, "Updating index allocation setting");

        for chunk in chunk_index_list(&self.indices) {
            self.client.put_index_settings(&chunk, &body).await?;
            if self.wait.wait_for_completion {
                debug!(indices = chunk.len(), "Waiting for shards to complete relocation");
                wait_on(
                    self.client.as_ref(),
                    WaitTarget::Allocation { indices: chunk },
                    &self.wait,
                )
                .await?
                .into_result()?;
            }
        }
        Ok(())
    }
}
