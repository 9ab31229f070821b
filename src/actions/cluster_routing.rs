//! Transient cluster-wide routing settings

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{wait_on, ClusterAction};
use crate::client::ClusterClient;
use crate::config::{WaitOptions, DEFAULT_WAIT_INTERVAL_SECS};
use crate::wait::WaitTarget;
use crate::{Error, Result};

/// Routing concern being toggled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingType {
    /// `cluster.routing.allocation.*`
    Allocation,
    /// `cluster.routing.rebalance.*`
    Rebalance,
}

impl RoutingType {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Allocation => matches!(value, "all" | "primaries" | "new_primaries" | "none"),
            Self::Rebalance => matches!(value, "all" | "primaries" | "replicas" | "none"),
        }
    }
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation => f.write_str("allocation"),
            Self::Rebalance => f.write_str("rebalance"),
        }
    }
}

impl FromStr for RoutingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allocation" => Ok(Self::Allocation),
            "rebalance" => Ok(Self::Rebalance),
            other => Err(Error::configuration(format!(
                "invalid value for \"routing_type\": {}",
                other
            ))),
        }
    }
}

/// Sets `cluster.routing.<type>.enable` as a transient setting
pub struct ClusterRouting {
    client: Arc<dyn ClusterClient>,
    routing_type: RoutingType,
    value: String,
    wait: WaitOptions,
}

impl ClusterRouting {
    /// `setting` must be `enable`; `value` is checked against `routing_type`.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        routing_type: RoutingType,
        setting: &str,
        value: &str,
    ) -> Result<Self> {
        if setting != "enable" {
            return Err(Error::configuration(format!(
                "invalid value for \"setting\": {}",
                setting
            )));
        }
        if !routing_type.accepts(value) {
            return Err(Error::configuration(format!(
                "invalid \"value\": {} with \"routing_type\": {}",
                value, routing_type
            )));
        }
        Ok(Self {
            client,
            routing_type,
            value: value.to_string(),
            wait: WaitOptions::no_wait(DEFAULT_WAIT_INTERVAL_SECS),
        })
    }

    /// Wait for relocation to settle after the change
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Cluster settings body
    pub fn body(&self) -> Value {
        let key = format!("cluster.routing.{}.enable", self.routing_type);
        json!({ "transient": { key: self.value } })
    }
}

#[async_trait]
impl ClusterAction for ClusterRouting {
    fn name(&self) -> &'static str {
        "cluster_routing"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(body = %self.body(), "DRY-RUN: would update cluster routing settings");
    }

    async fn do_action(&self) -> Result<()> {
        let body = self.body();
        info!(body = %body, "Updating cluster settings");
        self.client.put_cluster_settings(&body).await?;

        if self.wait.wait_for_completion {
            debug!("Waiting for shards to complete routing and rebalancing");
            wait_on(self.client.as_ref(), WaitTarget::ClusterRouting, &self.wait)
                .await?
                .into_result()?;
        }
        Ok(())
    }
}
