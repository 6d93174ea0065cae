//! Control-plane client for the co-located file service
//!
//! The file service owns the actual syncing; this daemon only keeps its
//! peer list current. Config rewrites happen directly on the service's
//! JSON config file; everything else is a form POST against its local
//! HTTP API, which wraps every reply in a `{message, status, data}`
//! envelope.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Control-plane errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {0} is not a JSON object")]
    NotAnObject(PathBuf),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("control plane rejected request: {0}")]
    Rejected(String),
}

/// Reply envelope the file service wraps every response in.
#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client for the file service's local control plane.
pub struct Manager {
    http: Client,
    base_url: String,
    group: String,
    config_path: PathBuf,
}

impl Manager {
    pub fn new(base_url: String, group: String, config_path: PathBuf) -> Self {
        Self {
            http: Client::new(),
            base_url,
            group,
            config_path,
        }
    }

    /// Rewrite one key in the file service's JSON config on disk.
    pub fn update_node_conf(&self, key: &str, value: impl Serialize) -> Result<(), ManagerError> {
        let bytes = fs::read(&self.config_path).map_err(|source| ManagerError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        let mut conf: Value = serde_json::from_slice(&bytes)?;
        let map = conf
            .as_object_mut()
            .ok_or_else(|| ManagerError::NotAnObject(self.config_path.clone()))?;

        map.insert(key.to_string(), serde_json::to_value(value)?);

        let bytes = serde_json::to_vec_pretty(&conf)?;
        fs::write(&self.config_path, bytes).map_err(|source| ManagerError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Ask the file service to reload its config.
    pub async fn flash_node_conf(&self) -> Result<(), ManagerError> {
        let url = format!("{}/{}/reload", self.base_url, self.group);
        self.post(&url, &[("action", "reload")]).await
    }

    /// Trigger a sync of one day's files.
    pub async fn sync_file(&self, date: &str, force: bool) -> Result<(), ManagerError> {
        let url = format!("{}/{}/sync", self.base_url, self.group);
        self.post(&url, &[("date", date), ("force", if force { "1" } else { "0" })])
            .await
    }

    /// Trigger a full repair sync.
    pub async fn sync_all(&self) -> Result<(), ManagerError> {
        let url = format!("{}/{}/repair", self.base_url, self.group);
        self.post(&url, &[("force", "1")]).await
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<(), ManagerError> {
        let reply: ApiResult = self
            .http
            .post(url)
            .form(form)
            .send()
            .await?
            .json()
            .await?;

        if reply.status != "ok" {
            return Err(ManagerError::Rejected(reply.message));
        }
        debug!(%url, "control plane accepted");
        Ok(())
    }
}
