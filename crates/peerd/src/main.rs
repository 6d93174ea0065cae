//! peerd - syncmesh membership and discovery daemon
//!
//! Maintains the local route table, gossips it to peers over TCP, and
//! keeps the co-located file service's peer list current.

use clap::Parser;
use peerd::config::{Cli, Config};
use peerd::dispatch;
use peerd::maintenance::{self, MaintenanceLoop};
use peerd::manager::Manager;
use peerd::table::RouteTable;
use std::process::ExitCode;
use std::sync::Arc;
use syncmesh_core::Message;
use syncmesh_net::transport;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("peerd=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "peerd v{} - node {} (group {})",
        env!("CARGO_PKG_VERSION"),
        config.peer_id,
        config.group
    );

    let table = match RouteTable::open(&config.route_path) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            error!("failed to open route table: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "loaded {} known peers from {}",
        table.len(),
        config.route_path.display()
    );

    // The transport owns the sender; the channel closing is the
    // shutdown signal for the dispatcher.
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let mut server = tokio::spawn(transport::serve(config.listen_addr(), inbound_tx));
    let mut dispatcher = tokio::spawn(dispatch::run(
        inbound_rx,
        table.clone(),
        config.clone(),
    ));

    tokio::spawn(maintenance::heartbeat_loop(
        table.clone(),
        config.self_item(),
        config.flash_interval(),
    ));

    let manager = Manager::new(
        config.manager_url.clone(),
        config.group.clone(),
        config.config_path.clone(),
    );
    tokio::spawn(MaintenanceLoop::new(table.clone(), manager, config.flash_interval()).run());

    // One-shot discovery bootstrap
    if let Some(neighbor) = config.neighbor.as_deref() {
        let request = Message::request(config.node_endpoint());
        if let Err(e) = transport::send(neighbor, &request).await {
            error!(%neighbor, "initial discovery request failed: {e}");
            return ExitCode::from(3);
        }
        info!(%neighbor, "requested route table from neighbor");
    }

    tokio::select! {
        result = &mut server => {
            match result {
                Ok(Err(e)) => error!("transport failed: {e}"),
                Ok(Ok(())) => error!("transport stopped unexpectedly"),
                Err(e) => error!("transport task died: {e}"),
            }
            ExitCode::FAILURE
        }
        result = &mut dispatcher => {
            if let Err(e) = result {
                error!("dispatcher task died: {e}");
            }
            ExitCode::FAILURE
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            ExitCode::SUCCESS
        }
    }
}
