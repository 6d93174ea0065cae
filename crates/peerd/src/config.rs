//! Configuration for peerd
//!
//! All settings live in a TOML file; the only command-line surface is
//! the path to it. The loaded [`Config`] is built once at startup and
//! handed to each component; nothing reads ambient global state.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncmesh_core::RouteItem;

/// peerd - syncmesh membership daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "peerd")]
#[command(about = "Membership and discovery daemon for a syncmesh cluster")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./conf.toml")]
    pub config: PathBuf,
}

fn default_route_path() -> PathBuf {
    "./comm/route.json".into()
}

fn default_flash_interval() -> u64 {
    10
}

fn default_manager_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Node settings from the TOML config file.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Human-readable node name
    #[serde(rename = "PeerName")]
    pub peer_name: String,
    /// Host this node is reachable on
    #[serde(rename = "PeerAddr")]
    pub peer_addr: String,
    /// Port of the co-located file-sync service
    #[serde(rename = "PeerPort")]
    pub peer_port: u16,
    /// Stable unique identifier for this node
    #[serde(rename = "PeerID")]
    pub peer_id: String,
    /// Cluster/shard this node belongs to
    #[serde(rename = "Group")]
    pub group: String,
    /// Bootstrap neighbor (`host:port` of its daemon), if any
    #[serde(rename = "Neighbor", default)]
    pub neighbor: Option<String>,
    /// Path of the file service's own JSON config file
    #[serde(rename = "ConfigPath")]
    pub config_path: PathBuf,
    /// Port this daemon's TCP listener binds
    #[serde(rename = "NodePort")]
    pub node_port: u16,
    /// Where the route table is persisted
    #[serde(rename = "RoutePath", default = "default_route_path")]
    pub route_path: PathBuf,
    /// Seconds between maintenance/heartbeat ticks
    #[serde(rename = "FlashIntervalSecs", default = "default_flash_interval")]
    pub flash_interval_secs: u64,
    /// Base URL of the file service's control plane
    #[serde(rename = "ManagerUrl", default = "default_manager_url")]
    pub manager_url: String,
}

impl Config {
    /// Read and validate the config file. Missing or unparsable files
    /// are fatal startup errors.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.peer_id.is_empty() {
            anyhow::bail!("PeerID cannot be empty");
        }
        if self.peer_addr.is_empty() {
            anyhow::bail!("PeerAddr cannot be empty");
        }
        if self.group.is_empty() {
            anyhow::bail!("Group cannot be empty");
        }
        if self.peer_port == 0 || self.node_port == 0 {
            anyhow::bail!("PeerPort and NodePort must be set");
        }
        if self.flash_interval_secs == 0 {
            anyhow::bail!("FlashIntervalSecs must be at least 1");
        }
        Ok(())
    }

    pub fn flash_interval(&self) -> Duration {
        Duration::from_secs(self.flash_interval_secs)
    }

    /// This node's identity as gossiped to peers. FlashTime stays
    /// unset; receivers stamp it on arrival.
    pub fn self_item(&self) -> RouteItem {
        RouteItem {
            peer_id: self.peer_id.clone(),
            group_id: self.group.clone(),
            peer_addr: self.peer_addr.clone(),
            peer_port: self.peer_port,
            node_port: self.node_port,
            flash_time: 0,
        }
    }

    /// The callback address peers reach this daemon on.
    pub fn node_endpoint(&self) -> String {
        format!("{}:{}", self.peer_addr, self.node_port)
    }

    /// Local bind address for the TCP listener.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.node_port)
    }
}
