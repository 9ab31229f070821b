//! reqwest-backed [`ClusterClient`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{IndexAliases, SnapshotList};
use super::{
    ClusterClient, ClusterHealth, IndexRecovery, IndexSettings, ReindexParams, RolloverResponse,
    SnapshotInfo, TaskStatus,
};
use crate::config::ClientConfig;
use crate::{Error, Result};

/// Cluster client speaking the REST API over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpClusterClient {
    http: reqwest::Client,
    hosts: Vec<String>,
    username: Option<String>,
    password: Option<String>,
    master_timeout: Duration,
}

#[derive(Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Deserialize)]
struct ReindexAccepted {
    task: String,
}

impl HttpClusterClient {
    /// Build a client from validated configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder().timeout(config.timeout());

        if let Some(ref path) = config.certificate {
            let pem = std::fs::read(path).map_err(|e| {
                Error::configuration(format!(
                    "failed to read certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::configuration(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if config.ssl_no_validate {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            hosts: config
                .hosts
                .iter()
                .map(|h| h.trim_end_matches('/').to_string())
                .collect(),
            username: config.username.clone(),
            password: config.password.clone(),
            master_timeout: config.master_timeout(),
        })
    }

    /// Send a request, moving on to the next host only when the connection fails
    async fn send(
        &self,
        context: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut last_error = None;

        for host in &self.hosts {
            let url = format!("{}{}", host, path);
            let mut request = self.http.request(method.clone(), &url).query(query);
            if let Some(ref user) = self.username {
                request = request.basic_auth(user, self.password.as_ref());
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, %url, "Sending cluster request");
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() => {
                    warn!(host = %host, context, error = %e, "Host unreachable, trying next");
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(Error::transport(context, e)),
            }
        }

        Err(Error::transport(
            context,
            last_error.unwrap_or_else(|| "no hosts configured".to_string()),
        ))
    }

    /// Map 404 to `NotFound` and other non-success codes to `Api`
    async fn check(response: Response, missing: impl FnOnce() -> String) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found(missing()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::api(status.as_u16(), body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        context: &str,
        path: &str,
        query: &[(&str, String)],
        missing: impl FnOnce() -> String,
    ) -> Result<T> {
        let response = self.send(context, Method::GET, path, query, None).await?;
        let response = Self::check(response, missing).await?;
        response
            .json()
            .await
            .map_err(|e| Error::transport(context, format!("invalid response body: {}", e)))
    }

    async fn execute(
        &self,
        context: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        missing: impl FnOnce() -> String,
    ) -> Result<()> {
        let response = self.send(context, method, path, query, body).await?;
        Self::check(response, missing).await?;
        Ok(())
    }
}

fn csv(indices: &[String]) -> String {
    indices.join(",")
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn cluster_health(&self, indices: &[String]) -> Result<ClusterHealth> {
        let path = if indices.is_empty() {
            "/_cluster/health".to_string()
        } else {
            format!("/_cluster/health/{}", csv(indices))
        };
        self.get_json("cluster_health", &path, &[], || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn snapshot_status(&self, repository: &str, name: &str) -> Result<SnapshotInfo> {
        let path = format!("/_snapshot/{}/{}", repository, name);
        let missing = || format!("snapshot {} in repository {}", name, repository);
        let list: SnapshotList = self.get_json("snapshot_status", &path, &[], missing).await?;
        list.snapshots
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(missing()))
    }

    async fn list_snapshots(&self, repository: &str) -> Result<Vec<SnapshotInfo>> {
        let path = format!("/_snapshot/{}/_all", repository);
        let list: SnapshotList = self
            .get_json("list_snapshots", &path, &[], || {
                format!("repository {}", repository)
            })
            .await?;
        Ok(list.snapshots)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let path = format!("/_tasks/{}", task_id);
        self.get_json("task_status", &path, &[], || format!("task {}", task_id))
            .await
    }

    async fn list_indices(&self) -> Result<Vec<String>> {
        let query = [
            ("format", "json".to_string()),
            ("h", "index".to_string()),
            ("expand_wildcards", "open,closed".to_string()),
        ];
        let rows: Vec<CatIndex> = self
            .get_json("list_indices", "/_cat/indices", &query, || {
                "index listing".to_string()
            })
            .await?;
        let mut names: Vec<String> = rows.into_iter().map(|r| r.index).collect();
        names.sort();
        Ok(names)
    }

    async fn index_settings(&self, index: &str) -> Result<IndexSettings> {
        let path = format!("/{}/_settings", index);
        let body: Value = self
            .get_json("index_settings", &path, &[], || format!("index {}", index))
            .await?;
        IndexSettings::from_settings_body(index, &body).ok_or_else(|| {
            Error::transport(
                "index_settings",
                format!("settings for {} lack shard/replica counts", index),
            )
        })
    }

    async fn index_recovery(&self, indices: &[String]) -> Result<BTreeMap<String, IndexRecovery>> {
        let path = format!("/{}/_recovery", csv(indices));
        self.get_json("index_recovery", &path, &[], || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn repository_exists(&self, repository: &str) -> Result<bool> {
        let path = format!("/_snapshot/{}", repository);
        let response = self
            .send("repository_exists", Method::GET, &path, &[], None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response, || format!("repository {}", repository)).await?;
        Ok(true)
    }

    async fn verify_repository(&self, repository: &str) -> Result<()> {
        let path = format!("/_snapshot/{}/_verify", repository);
        self.execute("verify_repository", Method::POST, &path, &[], None, || {
            format!("repository {}", repository)
        })
        .await
    }

    async fn index_aliases(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let body: BTreeMap<String, IndexAliases> = self
            .get_json("index_aliases", "/_alias", &[], || "alias listing".to_string())
            .await?;
        Ok(body
            .into_iter()
            .map(|(index, entry)| (index, entry.aliases.into_keys().collect()))
            .collect())
    }

    async fn put_index_settings(&self, indices: &[String], settings: &Value) -> Result<()> {
        let path = format!("/{}/_settings", csv(indices));
        self.execute(
            "put_index_settings",
            Method::PUT,
            &path,
            &[],
            Some(settings),
            || format!("indices {}", csv(indices)),
        )
        .await
    }

    async fn put_cluster_settings(&self, body: &Value) -> Result<()> {
        self.execute(
            "put_cluster_settings",
            Method::PUT,
            "/_cluster/settings",
            &[],
            Some(body),
            || "cluster settings".to_string(),
        )
        .await
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        let path = format!("/{}", name);
        self.execute("create_index", Method::PUT, &path, &[], Some(body), || {
            format!("index {}", name)
        })
        .await
    }

    async fn delete_indices(
        &self,
        indices: &[String],
        master_timeout: Option<Duration>,
    ) -> Result<()> {
        let path = format!("/{}", csv(indices));
        let master_timeout = master_timeout.unwrap_or(self.master_timeout);
        let query = [("master_timeout", format!("{}s", master_timeout.as_secs()))];
        self.execute("delete_indices", Method::DELETE, &path, &query, None, || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn open_indices(&self, indices: &[String]) -> Result<()> {
        let path = format!("/{}/_open", csv(indices));
        self.execute("open_indices", Method::POST, &path, &[], None, || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn close_indices(&self, indices: &[String]) -> Result<()> {
        let path = format!("/{}/_close", csv(indices));
        let query = [("ignore_unavailable", "true".to_string())];
        self.execute("close_indices", Method::POST, &path, &query, None, || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn flush_indices(&self, indices: &[String]) -> Result<()> {
        let path = format!("/{}/_flush", csv(indices));
        let query = [("ignore_unavailable", "true".to_string())];
        self.execute("flush_indices", Method::POST, &path, &query, None, || {
            format!("indices {}", csv(indices))
        })
        .await
    }

    async fn delete_aliases(&self, indices: &[String]) -> Result<()> {
        let path = format!("/{}/_alias/_all", csv(indices));
        self.execute("delete_aliases", Method::DELETE, &path, &[], None, || {
            format!("aliases on {}", csv(indices))
        })
        .await
    }

    async fn update_aliases(&self, body: &Value) -> Result<()> {
        self.execute(
            "update_aliases",
            Method::POST,
            "/_aliases",
            &[],
            Some(body),
            || "aliases".to_string(),
        )
        .await
    }

    async fn rollover(
        &self,
        alias: &str,
        body: &Value,
        dry_run: bool,
        wait_for_active_shards: &str,
    ) -> Result<RolloverResponse> {
        let path = format!("/{}/_rollover", alias);
        let query = [
            ("dry_run", dry_run.to_string()),
            ("wait_for_active_shards", wait_for_active_shards.to_string()),
        ];
        let response = self
            .send("rollover", Method::POST, &path, &query, Some(body))
            .await?;
        let response = Self::check(response, || format!("alias {}", alias)).await?;
        response
            .json()
            .await
            .map_err(|e| Error::transport("rollover", format!("invalid response body: {}", e)))
    }

    async fn forcemerge(&self, index: &str, max_num_segments: u32) -> Result<()> {
        let path = format!("/{}/_forcemerge", index);
        let query = [("max_num_segments", max_num_segments.to_string())];
        self.execute("forcemerge", Method::POST, &path, &query, None, || {
            format!("index {}", index)
        })
        .await
    }

    async fn create_snapshot(&self, repository: &str, name: &str, body: &Value) -> Result<()> {
        let path = format!("/_snapshot/{}/{}", repository, name);
        let query = [("wait_for_completion", "false".to_string())];
        self.execute(
            "create_snapshot",
            Method::PUT,
            &path,
            &query,
            Some(body),
            || format!("repository {}", repository),
        )
        .await
    }

    async fn restore_snapshot(&self, repository: &str, name: &str, body: &Value) -> Result<()> {
        let path = format!("/_snapshot/{}/{}/_restore", repository, name);
        let query = [("wait_for_completion", "false".to_string())];
        self.execute(
            "restore_snapshot",
            Method::POST,
            &path,
            &query,
            Some(body),
            || format!("snapshot {} in repository {}", name, repository),
        )
        .await
    }

    async fn delete_snapshot(&self, repository: &str, name: &str) -> Result<()> {
        let path = format!("/_snapshot/{}/{}", repository, name);
        self.execute("delete_snapshot", Method::DELETE, &path, &[], None, || {
            format!("snapshot {} in repository {}", name, repository)
        })
        .await
    }

    async fn reindex(&self, body: &Value, params: &ReindexParams) -> Result<String> {
        let mut query = vec![
            ("wait_for_completion", "false".to_string()),
            ("refresh", params.refresh.to_string()),
            ("slices", params.slices.to_string()),
            ("timeout", format!("{}s", params.timeout.as_secs())),
            ("wait_for_active_shards", params.wait_for_active_shards.clone()),
        ];
        if let Some(rps) = params.requests_per_second {
            query.push(("requests_per_second", rps.to_string()));
        }

        let response = self
            .send("reindex", Method::POST, "/_reindex", &query, Some(body))
            .await?;
        let response = Self::check(response, || "reindex source".to_string()).await?;
        let accepted: ReindexAccepted = response
            .json()
            .await
            .map_err(|e| Error::transport("reindex", format!("invalid response body: {}", e)))?;
        Ok(accepted.task)
    }
}
