//! # Game Protocol
//!
//! Binary protocol core of a tick-based multiplayer game server.
//!
//! Turns a TCP byte stream into decrypted, framed packets and drives the login
//! handshake that upgrades a raw socket into an authenticated session.
//!
//! ## Layers
//! - [`core`]: byte buffer with bit access, value codec, ISAAC opcode cipher
//! - [`protocol`]: login handshake, packet decoding and dispatch, outgoing packets
//! - [`game`]: world state serialized by outgoing packets
//! - [`transport`]: tokio TCP server and player slot registry
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```rust,no_run
//! use game_protocol::config::NetworkConfig;
//! use game_protocol::transport::GameServer;
//!
//! #[tokio::main]
//! async fn main() -> game_protocol::error::Result<()> {
//!     let config = NetworkConfig::default();
//!     game_protocol::utils::init_logging(&config.logging)?;
//!     GameServer::new(config.server)?.start().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
