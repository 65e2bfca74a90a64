//! # Transport Layer
//!
//! TCP accept loop, per-connection session tasks and the player slot registry.
//!
//! ## Components
//! - **Server**: tokio listener with graceful shutdown
//! - **Registry**: fixed slot table with idle eviction

pub mod registry;
pub mod server;

pub use registry::{ConnectionRegistry, SlotHandle};
pub use server::GameServer;
