//! Alias membership changes
//!
//! [`Alias`] collects `add` and `remove` statements for one alias and sends
//! them in a single atomic `update_aliases` call, so an index can move from
//! one alias state to the other without a gap.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{ensure_indices, parse_date_pattern, ClusterAction};
use crate::client::ClusterClient;
use crate::{Error, Result};

/// Adds indices to and removes indices from a single alias
pub struct Alias {
    client: Arc<dyn ClusterClient>,
    name: String,
    extra_settings: Map<String, Value>,
    actions: Vec<Value>,
}

impl Alias {
    /// Alias `name`, which may contain strftime escapes
    ///
    /// `extra_settings` (filter, routing, ...) is merged into every `add`.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        name: &str,
        extra_settings: Option<Map<String, Value>>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::missing_argument("no value for \"name\" provided"));
        }
        Ok(Self {
            client,
            name: parse_date_pattern(name)?,
            extra_settings: extra_settings.unwrap_or_default(),
            actions: Vec::new(),
        })
    }

    /// Alias name after date expansion
    pub fn alias_name(&self) -> &str {
        &self.name
    }

    /// Queue an `add` for every index
    ///
    /// An empty selection is an error unless `warn_if_no_indices` is set, in
    /// which case it is logged and nothing is queued.
    pub fn add(&mut self, indices: &[String], warn_if_no_indices: bool) -> Result<()> {
        if !self.check_selection(indices, warn_if_no_indices, "add to")? {
            return Ok(());
        }
        for index in indices {
            debug!(index = %index, alias = %self.name, "Adding index to alias");
            let mut add = Map::new();
            add.insert("index".to_string(), Value::from(index.as_str()));
            add.insert("alias".to_string(), Value::from(self.name.as_str()));
            for (key, value) in &self.extra_settings {
                add.insert(key.clone(), value.clone());
            }
            self.actions.push(json!({ "add": add }));
        }
        Ok(())
    }

    /// Queue a `remove` for every index currently attached to the alias
    ///
    /// Indices not associated with the alias are skipped.
    pub async fn remove(&mut self, indices: &[String], warn_if_no_indices: bool) -> Result<()> {
        if !self.check_selection(indices, warn_if_no_indices, "remove from")? {
            return Ok(());
        }
        let aliases = self.client.index_aliases().await?;
        for index in indices {
            let attached = aliases
                .get(index)
                .is_some_and(|names| names.iter().any(|n| n == &self.name));
            if attached {
                debug!(index = %index, alias = %self.name, "Removing index from alias");
                self.actions
                    .push(json!({ "remove": { "index": index, "alias": self.name } }));
            } else {
                debug!(index = %index, alias = %self.name, "Index is not associated with alias");
            }
        }
        Ok(())
    }

    /// Whether to go on with the selection; empty selections either warn or
    /// fail with [`Error::NoIndices`]
    fn check_selection(&self, indices: &[String], warn_only: bool, verb: &str) -> Result<bool> {
        match ensure_indices("alias", indices) {
            Ok(()) => Ok(true),
            Err(_) if warn_only => {
                warn!(alias = %self.name, "No indices selected. Nothing to {} alias", verb);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// `update_aliases` request body
    pub fn body(&self) -> Result<Value> {
        if self.actions.is_empty() {
            return Err(Error::failed_execution("no \"add\" or \"remove\" operations"));
        }
        Ok(json!({ "actions": self.actions }))
    }
}

#[async_trait]
impl ClusterAction for Alias {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        if self.actions.is_empty() {
            warn!(alias = %self.name, "DRY-RUN: no alias operations queued");
        }
        for action in &self.actions {
            let (job, target) = match action.as_object().and_then(|o| o.iter().next()) {
                Some((job, target)) => (job.as_str(), target),
                None => continue,
            };
            let index = target.get("index").and_then(Value::as_str).unwrap_or_default();
            let (verb, preposition) = if job == "add" {
                ("adding", "to")
            } else {
                ("removing", "from")
            };
            info!(
                "DRY-RUN: alias: {} index \"{}\" {} alias \"{}\"",
                verb, index, preposition, self.name
            );
        }
    }

    async fn do_action(&self) -> Result<()> {
        let body = self.body()?;
        info!(alias = %self.name, actions = self.actions.len(), "Updating aliases");
        self.client.update_aliases(&body).await
    }
}
