//! Syncmesh Core Library
//!
//! Wire types and the envelope codec for the syncmesh peer protocol.
//! Every byte that crosses the network or lands in `route.json` is one
//! of the types in [`types`], encoded as JSON with fixed field names.
//!
//! # Modules
//!
//! - [`types`]: Protocol types (RouteItem, Message, Payload)
//! - [`error`]: Error types

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
