//! Gossip dispatcher
//!
//! Single consumer of the inbound message channel. All route table
//! mutations driven by the network go through this one task, so the
//! dispatch logic itself needs no lock; the table's own accessors keep
//! the maintenance loop safe alongside it.

use crate::config::Config;
use crate::table::RouteTable;
use std::sync::Arc;
use syncmesh_core::{Message, Payload};
use syncmesh_net::transport;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Consume the channel until it closes. The sender lives in the
/// transport's accept loop, so this ends when the listener dies.
pub async fn run(
    mut inbound: mpsc::Receiver<Message>,
    table: Arc<RouteTable>,
    config: Arc<Config>,
) {
    while let Some(msg) = inbound.recv().await {
        handle(msg, &table, &config);
    }
    debug!("dispatch channel closed, dispatcher stopping");
}

/// Apply one decoded envelope to the table. A message that fails its
/// precondition is logged and dropped; it never stops the dispatcher.
fn handle(msg: Message, table: &RouteTable, config: &Config) {
    match msg.payload {
        Payload::Heartbeat(mut item) => {
            if let Err(e) = item.check_announce() {
                warn!("dropping heartbeat: {e}");
                return;
            }
            item.touch();
            debug!(peer = %item.peer_id, "heartbeat");
            table.update(item);
        }
        Payload::Data(items) => {
            // Bulk merge; entries absent from the push are kept
            debug!(count = items.len(), "merging route table push");
            for item in items {
                table.update(item);
            }
        }
        Payload::Request(callback) => {
            if callback.is_empty() {
                warn!("dropping request with empty callback address");
                return;
            }
            let mut entries = table.snapshot();
            entries.push(config.self_item());
            let reply = Message::data(entries);
            debug!(%callback, "sending route table");
            tokio::spawn(async move {
                if let Err(e) = transport::send(&callback, &reply).await {
                    warn!(%callback, "route table reply failed: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmesh_core::RouteItem;
    use tempfile::tempdir;

    fn config_for(id: &str) -> Arc<Config> {
        Arc::new(
            toml::from_str(&format!(
                r#"
                PeerName = "node-{id}"
                PeerAddr = "127.0.0.1"
                PeerPort = 8000
                PeerID = "{id}"
                Group = "g1"
                ConfigPath = "./fileserver.json"
                NodePort = 9000
                "#
            ))
            .unwrap(),
        )
    }

    fn test_config() -> Arc<Config> {
        config_for("self")
    }

    fn test_table() -> (Arc<RouteTable>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let table = RouteTable::open(dir.path().join("route.json")).unwrap();
        (Arc::new(table), dir)
    }

    fn item(id: &str) -> RouteItem {
        RouteItem {
            peer_id: id.to_string(),
            group_id: "g1".to_string(),
            peer_addr: "10.0.0.9".to_string(),
            peer_port: 8000,
            node_port: 9000,
            flash_time: 0,
        }
    }

    #[tokio::test]
    async fn test_heartbeat_inserts_and_stamps() {
        let (table, _dir) = test_table();

        handle(Message::heartbeat(item("p1")), &table, &test_config());

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer_id, "p1");
        // FlashTime is the receive time, not the sender's zero
        assert!(snapshot[0].flash_time > 0);
    }

    #[tokio::test]
    async fn test_heartbeat_missing_fields_dropped() {
        let (table, _dir) = test_table();

        let mut bad = item("");
        handle(Message::heartbeat(bad.clone()), &table, &test_config());
        bad.peer_id = "p1".to_string();
        bad.peer_addr = String::new();
        handle(Message::heartbeat(bad), &table, &test_config());

        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_data_bulk_merge_keeps_absentees() {
        let (table, _dir) = test_table();
        table.update(item("old"));

        handle(
            Message::data(vec![item("p1"), item("p2")]),
            &table,
            &test_config(),
        );

        let mut ids: Vec<_> = table
            .snapshot()
            .into_iter()
            .map(|e| e.peer_id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["old", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_request_sends_table_plus_self() {
        let (table, _dir) = test_table();
        table.update(item("p1"));

        // Stand in for the requester's daemon
        let (listener, addr) = transport::bind_local().await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(transport::serve_listener(listener, tx));

        handle(Message::request(addr.to_string()), &table, &test_config());

        let reply = rx.recv().await.unwrap();
        match reply.payload {
            Payload::Data(items) => {
                let mut ids: Vec<_> = items.into_iter().map(|e| e.peer_id).collect();
                ids.sort();
                assert_eq!(ids, ["p1", "self"]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discovery_handshake_seeds_requester_table() {
        // Node A: empty table, listening on an ephemeral port
        let (table_a, _dir_a) = test_table();
        let config_a = config_for("a");
        let (listener, addr_a) = transport::bind_local().await.unwrap();
        let (tx, mut rx_a) = mpsc::channel(16);
        tokio::spawn(transport::serve_listener(listener, tx));

        // Node B: also empty, answers A's one-shot discovery request
        let (table_b, _dir_b) = test_table();
        handle(
            Message::request(addr_a.to_string()),
            &table_b,
            &config_for("b"),
        );

        // A's dispatcher consumes B's reply
        let reply = rx_a.recv().await.unwrap();
        handle(reply, &table_a, &config_a);

        let snapshot = table_a.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer_id, "b");
    }

    #[tokio::test]
    async fn test_empty_request_dropped() {
        let (table, _dir) = test_table();
        table.update(item("p1"));

        handle(Message::request(""), &table, &test_config());
        // Nothing to observe but the absence of a panic or mutation
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let (table, _dir) = test_table();
        let (tx, rx) = mpsc::channel(4);

        let consumer = tokio::spawn(run(rx, table.clone(), test_config()));
        tx.send(Message::heartbeat(item("p1"))).await.unwrap();
        drop(tx);

        consumer.await.unwrap();
        assert_eq!(table.len(), 1);
    }
}
