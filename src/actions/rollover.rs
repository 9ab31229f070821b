//! Alias rollover

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_date_pattern, ClusterAction};
use crate::client::{ClusterClient, RolloverResponse};
use crate::{Error, Result};

/// Rolls a write alias over to a fresh index once its conditions are met
///
/// The alias must point at exactly one index. Conditions (`max_age`,
/// `max_docs`, `max_size`) are evaluated by the cluster.
pub struct Rollover {
    client: Arc<dyn ClusterClient>,
    alias: String,
    conditions: Value,
    settings: Option<Value>,
    wait_for_active_shards: String,
}

impl Rollover {
    /// Rollover of `alias` under `conditions`
    ///
    /// `conditions` must be an object, and `extra_settings` an object when
    /// given; anything else is [`Error::Configuration`].
    pub fn new(
        client: Arc<dyn ClusterClient>,
        alias: &str,
        conditions: Value,
        extra_settings: Option<Value>,
    ) -> Result<Self> {
        if alias.is_empty() {
            return Err(Error::missing_argument("no value for \"name\" provided"));
        }
        if !conditions.is_object() {
            return Err(Error::configuration("\"conditions\" must be a dictionary"));
        }
        if extra_settings.as_ref().is_some_and(|s| !s.is_object()) {
            return Err(Error::configuration(
                "\"extra_settings\" must be a dictionary or None",
            ));
        }
        Ok(Self {
            client,
            alias: parse_date_pattern(alias)?,
            conditions,
            settings: extra_settings,
            wait_for_active_shards: "1".to_string(),
        })
    }

    /// Active shard count to wait for on the new index (`"all"` or a number)
    pub fn with_wait_for_active_shards(mut self, count: impl Into<String>) -> Self {
        self.wait_for_active_shards = count.into();
        self
    }

    /// `_rollover` request body
    pub fn body(&self) -> Value {
        let mut body = json!({ "conditions": self.conditions });
        if let Some(settings) = &self.settings {
            body["settings"] = settings.clone();
        }
        body
    }

    /// Fail unless exactly one index carries the alias
    pub async fn ensure_rollable(&self) -> Result<()> {
        let aliases = self.client.index_aliases().await?;
        let holders = aliases
            .values()
            .filter(|names| names.iter().any(|n| n == &self.alias))
            .count();
        if holders != 1 {
            return Err(Error::configuration(format!(
                "alias \"{}\" must point to exactly one index, found {}",
                self.alias, holders
            )));
        }
        Ok(())
    }

    /// Ask the cluster which conditions would trigger, changing nothing
    pub async fn dry_run(&self) -> Result<RolloverResponse> {
        self.ensure_rollable().await?;
        let result = self
            .client
            .rollover(&self.alias, &self.body(), true, &self.wait_for_active_shards)
            .await?;
        for (condition, met) in &result.conditions {
            info!("DRY-RUN: rollover: {} result: {}", condition, met);
        }
        Ok(result)
    }
}

#[async_trait]
impl ClusterAction for Rollover {
    fn name(&self) -> &'static str {
        "rollover"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(
            "DRY-RUN: rollover: alias \"{}\" body {}",
            self.alias,
            self.body()
        );
    }

    async fn do_action(&self) -> Result<()> {
        self.ensure_rollable().await?;
        info!(alias = %self.alias, "Performing index rollover");
        let result = self
            .client
            .rollover(&self.alias, &self.body(), false, &self.wait_for_active_shards)
            .await?;
        if result.rolled_over {
            info!(
                old_index = %result.old_index,
                new_index = %result.new_index,
                "Rolled over alias"
            );
        } else {
            warn!(alias = %self.alias, conditions = ?result.conditions, "Rollover conditions not met");
        }
        Ok(())
    }
}
