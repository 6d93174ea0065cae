//! Networking primitives for the syncmesh peer protocol
//!
//! This crate provides:
//! - Length-prefixed message framing
//! - One-shot TCP sends and the inbound accept loop
//! - Parallel broadcast fan-out with per-peer outcomes

pub mod framing;
pub mod transport;

pub use framing::MessageCodec;
pub use transport::{broadcast, send, serve, serve_listener, SendOutcome, TransportError};
