//! # TCP Game Server
//!
//! Accepts connections, gives each a registry slot and runs one task per
//! connection. A session task owns its socket and [`Session`] outright; the only
//! state shared between tasks is the [`ConnectionRegistry`], the handler
//! [`Dispatcher`] and the [`Authenticator`].
//!
//! ## Session task
//! Each task waits on three things at once:
//! - socket readable: read up to `read_budget` bytes, advance the handshake or
//!   dispatch packets, write whatever the session queued
//! - cycle tick: queue and write the player update
//! - eviction: the idle sweep or shutdown released the slot
//!
//! Any error ends the task. Frames queued before the error (such as a login
//! rejection code) are written first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::{ErrorCategory, ProtocolError, Result};
use crate::protocol::handshake::{
    AcceptAll, Authenticator, Credentials, Handshake, LoginGrant, LoginResponse, LoginStage,
};
use crate::protocol::session::{default_dispatcher, Session, SessionContext};
use crate::protocol::Dispatcher;
use crate::transport::registry::{ConnectionRegistry, SlotHandle};
use crate::utils::metrics::global_metrics;

/// Claims the login name for one slot, then defers to `inner`. The claim is
/// atomic in the registry, so two connections racing with one name cannot both
/// get in.
struct RegistryAuthenticator<'a> {
    inner: &'a dyn Authenticator,
    registry: &'a ConnectionRegistry,
    handle: &'a SlotHandle,
}

impl Authenticator for RegistryAuthenticator<'_> {
    fn authenticate(&self, credentials: &Credentials) -> std::result::Result<LoginGrant, LoginResponse> {
        match self.registry.claim_username(self.handle, &credentials.username) {
            Ok(true) => {}
            Ok(false) => return Err(LoginResponse::AlreadyOnline),
            Err(_) => return Err(LoginResponse::CouldNotComplete),
        }
        let granted = self.inner.authenticate(credentials);
        if granted.is_err() {
            if let Err(e) = self.registry.release_username(self.handle) {
                error!(error = %e, "Failed to release claimed username");
            }
        }
        granted
    }
}

struct Shared {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher<SessionContext>,
    authenticator: Arc<dyn Authenticator>,
}

/// Why a session task ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    Logout,
    Evicted,
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher<SessionContext>,
    authenticator: Arc<dyn Authenticator>,
}

impl GameServer {
    /// Server with the default packet handlers that accepts every login.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(ConnectionRegistry::new(config.max_players)),
            dispatcher: default_dispatcher()?,
            authenticator: Arc::new(AcceptAll),
            config,
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Handler registry; handlers registered here apply to every session.
    pub fn dispatcher(&self) -> &Dispatcher<SessionContext> {
        &self.dispatcher
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until CTRL+C.
    pub async fn start(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.start_with_shutdown(shutdown_rx).await
    }

    /// Bind the configured address and serve until `shutdown_rx` fires.
    pub async fn start_with_shutdown(self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.address).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve connections from an already bound listener.
    #[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
    pub async fn serve(self, listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(max_players = self.config.max_players, "Listening for players");

        let shared = Arc::new(Shared {
            authenticator: self.authenticator,
            config: self.config,
            registry: self.registry,
            dispatcher: self.dispatcher,
        });

        let sweeper = tokio::spawn(sweep_idle(Arc::clone(&shared)));
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for sessions to close...");
                    break;
                }

                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => match shared.registry.register(peer) {
                            Ok(handle) => {
                                global_metrics().connection_established();
                                sessions.spawn(run_session(stream, peer, handle, Arc::clone(&shared)));
                            }
                            Err(ProtocolError::ServerFull) => {
                                global_metrics().connection_refused();
                                warn!(%peer, "No free player slot, dropping connection");
                            }
                            Err(e) => error!(error = %e, "Failed to register connection"),
                        },
                        Err(e) => error!(error = %e, "Error accepting connection"),
                    }
                }
            }
        }

        sweeper.abort();
        let evicted = shared.registry.evict_all()?;
        debug!(evicted, "Released all slots");

        let drained = tokio::time::timeout(shared.config.shutdown_timeout, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining sessions");
            sessions.abort_all();
        }

        global_metrics().log_metrics();
        info!("Server stopped");
        Ok(())
    }
}

/// Evict idle slots once per cycle.
async fn sweep_idle(shared: Arc<Shared>) {
    let mut ticker = interval(shared.config.cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match shared.registry.sweep(shared.config.idle_timeout, Instant::now()) {
            Ok(evicted) => {
                for _ in evicted {
                    global_metrics().idle_eviction();
                }
            }
            Err(e) => error!(error = %e, "Idle sweep failed"),
        }
    }
}

#[instrument(skip_all, fields(slot = handle.slot(), %peer))]
async fn run_session(mut stream: TcpStream, peer: SocketAddr, handle: SlotHandle, shared: Arc<Shared>) {
    debug!("Connection accepted");
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let mut session = Session::new(
        handle.slot(),
        shared.config.inbound_capacity,
        Handshake::new(shared.config.opcode_cipher),
    );
    let outcome = drive_session(&mut stream, &mut session, &handle, &shared).await;

    let metrics = global_metrics();
    match &outcome {
        Ok(reason) => info!(?reason, username = ?session.username(), "Session closed"),
        Err(e) => {
            match e.category() {
                ErrorCategory::Resource => metrics.connection_error(),
                _ => metrics.protocol_error(),
            }
            if session.stage() != LoginStage::LoggedIn {
                metrics.handshake_failed();
            }
            warn!(error = %e, stage = ?session.stage(), "Session terminated");
        }
    }

    if let Err(e) = shared.registry.deregister(&handle) {
        error!(error = %e, "Failed to release slot");
    }
    let _ = stream.shutdown().await;
    metrics.connection_closed();
}

async fn drive_session(
    stream: &mut TcpStream,
    session: &mut Session,
    handle: &SlotHandle,
    shared: &Shared,
) -> Result<CloseReason> {
    let metrics = global_metrics();
    let mut read_buf = vec![0u8; shared.config.read_budget];
    let mut ticker = interval(shared.config.cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let authenticator = RegistryAuthenticator {
        inner: shared.authenticator.as_ref(),
        registry: &shared.registry,
        handle,
    };

    loop {
        tokio::select! {
            _ = handle.evicted() => return Ok(CloseReason::Evicted),

            read = stream.read(&mut read_buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(CloseReason::PeerClosed);
                }
                metrics.bytes_read(n as u64);
                shared.registry.touch(handle)?;

                let before = session.stage();
                let received = session.receive(&read_buf[..n], &authenticator, &shared.dispatcher);
                flush(stream, session).await?;
                let dispatched = received?;
                metrics.packets_dispatched(dispatched as u64);

                let after = session.stage();
                if before == LoginStage::Connected && after != LoginStage::Connected {
                    metrics.handshake_attempt();
                }
                if before != LoginStage::LoggedIn && after == LoginStage::LoggedIn {
                    metrics.handshake_success();
                }
                if session.is_closing() {
                    return Ok(CloseReason::Logout);
                }
            }

            _ = ticker.tick() => {
                session.tick()?;
                flush(stream, session).await?;
            }
        }
    }
}

async fn flush(stream: &mut TcpStream, session: &mut Session) -> Result<()> {
    for frame in session.take_outbound() {
        stream.write_all(&frame).await?;
        global_metrics().packet_sent(frame.len() as u64);
    }
    Ok(())
}
