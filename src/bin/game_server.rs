//! Game server binary.
//!
//! Usage: `game-server [config.toml]`. Without a path the defaults are used.
//! `GAME_PROTOCOL_*` environment variables override either.

use game_protocol::config::NetworkConfig;
use game_protocol::transport::GameServer;
use game_protocol::utils::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Server exited with an error");
        eprintln!("game-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> game_protocol::Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate_strict()?;

    init_logging(&config.logging)?;
    info!(
        address = %config.server.address,
        cipher = ?config.server.opcode_cipher,
        "Starting game server"
    );

    GameServer::new(config.server)?.start().await
}
