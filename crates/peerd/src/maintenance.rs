//! Periodic eviction, persistence, and control-plane notification
//!
//! Two independent tickers share the flash interval: the maintenance
//! loop ages peers out and pushes changes downstream, and the heartbeat
//! loop re-announces this node so peers keep refreshing our entry.

use crate::manager::Manager;
use crate::table::RouteTable;
use std::sync::Arc;
use std::time::Duration;
use syncmesh_core::{unix_millis, Message, RouteItem};
use syncmesh_net::transport;
use tokio::time::interval;
use tracing::{debug, warn};

/// A peer not heard from for this many flash intervals is dead.
const STALE_FACTOR: u64 = 3;

/// Evicts stale peers, persists the table on change, and tells the
/// file service about the new peer set.
pub struct MaintenanceLoop {
    table: Arc<RouteTable>,
    manager: Manager,
    flash_interval: Duration,
}

impl MaintenanceLoop {
    pub fn new(table: Arc<RouteTable>, manager: Manager, flash_interval: Duration) -> Self {
        Self {
            table,
            manager,
            flash_interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.flash_interval);
        loop {
            ticker.tick().await;
            self.tick(unix_millis()).await;
        }
    }

    async fn tick(&self, now: u64) {
        let peers = self.evict_stale(now);

        if !self.table.is_dirty() {
            return;
        }

        // A failed write keeps the dirty flag set; the peer list is
        // fresh regardless, so the control plane still gets it.
        if let Err(e) = self.table.persist() {
            warn!("route table persist failed: {e}");
        }

        if let Err(e) = self.manager.update_node_conf("peers", &peers) {
            warn!("peer list push failed: {e}");
            return;
        }
        if let Err(e) = self.manager.flash_node_conf().await {
            warn!("file service reload failed: {e}");
        }
    }

    /// Delete entries that missed three flash intervals and return the
    /// surviving file-service addresses.
    fn evict_stale(&self, now: u64) -> Vec<String> {
        let ttl = self.flash_interval.as_millis() as u64 * STALE_FACTOR;
        let mut peers = Vec::new();
        for item in self.table.snapshot() {
            if now.saturating_sub(item.flash_time) > ttl {
                debug!(peer = %item.peer_id, "evicting stale peer");
                self.table.delete(&item.peer_id);
                continue;
            }
            peers.push(item.peer_endpoint());
        }
        peers
    }
}

/// Re-announce this node to every known peer once per flash interval.
/// This is the only mechanism refreshing our FlashTime on remote
/// tables.
pub async fn heartbeat_loop(
    table: Arc<RouteTable>,
    self_item: RouteItem,
    flash_interval: Duration,
) {
    let mut ticker = interval(flash_interval);
    loop {
        ticker.tick().await;

        let targets: Vec<String> = table
            .snapshot()
            .iter()
            .map(|item| item.node_endpoint())
            .collect();
        if targets.is_empty() {
            continue;
        }

        let outcomes = transport::broadcast(targets, Message::heartbeat(self_item.clone())).await;
        for outcome in outcomes {
            if let Err(e) = outcome.result {
                warn!(addr = %outcome.addr, "heartbeat send failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(id: &str, flash_time: u64) -> RouteItem {
        RouteItem {
            peer_id: id.to_string(),
            group_id: "g1".to_string(),
            peer_addr: "10.0.0.1".to_string(),
            peer_port: 8000,
            node_port: 9000,
            flash_time,
        }
    }

    fn test_loop(flash_secs: u64) -> (MaintenanceLoop, Arc<RouteTable>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let table = Arc::new(RouteTable::open(dir.path().join("route.json")).unwrap());
        let manager = Manager::new(
            "http://127.0.0.1:8080".to_string(),
            "g1".to_string(),
            dir.path().join("fileserver.json"),
        );
        (
            MaintenanceLoop::new(table.clone(), manager, Duration::from_secs(flash_secs)),
            table,
            dir,
        )
    }

    #[test]
    fn test_stale_peer_evicted() {
        let (maintenance, table, _dir) = test_loop(10);
        let now = unix_millis();

        // Last heard 31s ago with a 10s interval: past the 3x window
        table.update(item("stale", now - 31_000));
        table.update(item("fresh", now - 5_000));

        let peers = maintenance.evict_stale(now);

        assert_eq!(peers, ["10.0.0.1:8000"]);
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer_id, "fresh");
    }

    #[test]
    fn test_peer_on_window_edge_survives() {
        let (maintenance, table, _dir) = test_loop(10);
        let now = unix_millis();

        table.update(item("edge", now - 30_000));
        maintenance.evict_stale(now);

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_refreshed_peer_survives_next_tick() {
        let (maintenance, table, _dir) = test_loop(10);
        let now = unix_millis();

        table.update(item("p1", now - 29_000));
        maintenance.evict_stale(now);
        assert_eq!(table.len(), 1);

        // A heartbeat lands before the next tick
        let mut refreshed = item("p1", 0);
        refreshed.flash_time = now + 1_000;
        table.update(refreshed);

        maintenance.evict_stale(now + 10_000);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_clean_table_tick_is_a_noop() {
        let (maintenance, table, dir) = test_loop(10);
        let now = unix_millis();

        table.update(item("p1", now));
        table.persist().unwrap();

        // No change since persist: tick must not touch the config file
        maintenance.tick(now).await;
        assert!(!dir.path().join("fileserver.json").exists());
        assert!(!table.is_dirty());
    }

    #[tokio::test]
    async fn test_dirty_tick_persists_table() {
        let (maintenance, table, dir) = test_loop(10);
        let now = unix_millis();

        table.update(item("p1", now));
        assert!(table.is_dirty());

        // The control-plane calls fail (nothing is listening, no config
        // file); persistence must happen regardless.
        maintenance.tick(now).await;

        assert!(!table.is_dirty());
        assert!(dir.path().join("route.json").exists());
    }
}
