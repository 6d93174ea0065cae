//! peerd - Syncmesh Membership and Discovery Daemon
//!
//! This daemon provides:
//! - The concurrent route table of known peers
//! - Gossip dispatch for heartbeat / data / request traffic
//! - Stale-peer eviction and route table persistence
//! - Control-plane notification when the peer set changes

pub mod config;
pub mod dispatch;
pub mod maintenance;
pub mod manager;
pub mod table;

pub use config::Config;
pub use maintenance::MaintenanceLoop;
pub use manager::Manager;
pub use table::RouteTable;
