//! Index creation

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_date_pattern, ClusterAction};
use crate::client::ClusterClient;
use crate::{Error, Result};

/// Creates a single index, expanding date escapes in its name
pub struct CreateIndex {
    client: Arc<dyn ClusterClient>,
    name: String,
    body: Value,
}

impl CreateIndex {
    /// Create `name` with optional settings and mappings in `body`
    ///
    /// A `null` body is sent as an empty object.
    pub fn new(client: Arc<dyn ClusterClient>, name: &str, body: Value) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::missing_argument("no value for \"name\" provided"));
        }
        let body = match body {
            Value::Null => json!({}),
            Value::Object(_) => body,
            _ => return Err(Error::configuration("\"extra_settings\" must be an object")),
        };
        Ok(Self {
            client,
            name: parse_date_pattern(name)?,
            body,
        })
    }

    /// Index name after date expansion
    pub fn index_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ClusterAction for CreateIndex {
    fn name(&self) -> &'static str {
        "create_index"
    }

    fn do_dry_run(&self) {
        info!("DRY-RUN MODE. No changes will be made.");
        info!(index = %self.name, body = %self.body, "DRY-RUN: would create index");
    }

    async fn do_action(&self) -> Result<()> {
        info!(index = %self.name, body = %self.body, "Creating index");
        self.client.create_index(&self.name, &self.body).await
    }
}
