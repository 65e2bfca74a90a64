//! # Session
//!
//! Everything one connection owns apart from its socket: the inbound buffer, the
//! handshake, the packet decoder, both ciphers and the player. A session is fed
//! raw bytes with [`Session::receive`], advanced once per game cycle with
//! [`Session::tick`], and drained of frames to write with
//! [`Session::take_outbound`]. It never blocks and never does I/O, so the
//! transport decides how bytes reach it.
//!
//! Frames queued before an error are still meant to be written: a rejected
//! login queues its response code and then fails with
//! [`ProtocolError::LoginRejected`].

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::core::buffer::ByteBuffer;
use crate::core::codec::{ByteOrder, ValueType};
use crate::core::isaac::OpcodeCipher;
use crate::error::{ProtocolError, Result};
use crate::game::PlayerState;
use crate::protocol::dispatcher::{Dispatcher, PacketDecoder};
use crate::protocol::handshake::{Authenticator, Handshake, HandshakeStep, LoginStage};
use crate::protocol::outgoing;
use crate::protocol::packet::Packet;

/// Incoming opcode of an interface button click.
pub const OPCODE_BUTTON: u8 = 185;
/// Button id of the logout button on the logout tab.
pub const BUTTON_LOGOUT: u16 = 9154;

/// State handed to packet handlers of a logged-in session.
pub struct SessionContext {
    pub player: PlayerState,
    encrypt: Box<dyn OpcodeCipher>,
    outbound: Vec<Bytes>,
    logout_requested: bool,
}

impl SessionContext {
    pub fn new(player: PlayerState, encrypt: Box<dyn OpcodeCipher>) -> Self {
        Self {
            player,
            encrypt,
            outbound: Vec::new(),
            logout_requested: false,
        }
    }

    /// Cipher every outgoing opcode of this session must pass through.
    pub fn encrypt(&mut self) -> &mut dyn OpcodeCipher {
        self.encrypt.as_mut()
    }

    /// Queue an encoded frame.
    pub fn send(&mut self, frame: Bytes) {
        self.outbound.push(frame);
    }

    /// Queue the logout packet; the session closes once it has been written.
    pub fn request_logout(&mut self) -> Result<()> {
        let frame = outgoing::logout(self.encrypt.as_mut())?;
        self.send(frame);
        self.logout_requested = true;
        Ok(())
    }

    pub fn logout_requested(&self) -> bool {
        self.logout_requested
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("player", &self.player)
            .field("queued", &self.outbound.len())
            .field("logout_requested", &self.logout_requested)
            .finish_non_exhaustive()
    }
}

fn handle_button(context: &mut SessionContext, packet: &mut Packet) -> Result<()> {
    let button = packet
        .reader()
        .read_short(ValueType::Standard, ByteOrder::Big)?;
    debug!(slot = context.player.slot, button, "button clicked");
    if button == BUTTON_LOGOUT {
        context.request_logout()?;
    }
    Ok(())
}

/// Dispatcher with the handlers every session needs.
pub fn default_dispatcher() -> Result<Dispatcher<SessionContext>> {
    let dispatcher = Dispatcher::new();
    dispatcher.register(OPCODE_BUTTON, handle_button)?;
    Ok(dispatcher)
}

/// One connection's protocol state.
pub struct Session<R = StdRng> {
    slot: usize,
    inbound: ByteBuffer,
    handshake: Handshake<R>,
    decoder: PacketDecoder,
    decrypt: Option<Box<dyn OpcodeCipher>>,
    context: Option<SessionContext>,
    outbound: Vec<Bytes>,
}

impl<R: RngCore> Session<R> {
    pub fn new(slot: usize, inbound_capacity: usize, handshake: Handshake<R>) -> Self {
        Self {
            slot,
            inbound: ByteBuffer::new(inbound_capacity),
            handshake,
            decoder: PacketDecoder::default(),
            decrypt: None,
            context: None,
            outbound: Vec::new(),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn stage(&self) -> LoginStage {
        self.handshake.stage()
    }

    pub fn username(&self) -> Option<&str> {
        self.handshake.username()
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.context.as_ref().map(|c| &c.player)
    }

    pub fn decoder(&self) -> &PacketDecoder {
        &self.decoder
    }

    /// True once a logout has been queued; the connection should close after
    /// the outbound frames are written.
    pub fn is_closing(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.logout_requested())
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.inbound.remaining()
    }

    /// Feed bytes read from the socket. Returns the number of game packets
    /// dispatched. A session that has logged out accepts no more input.
    pub fn receive(
        &mut self,
        bytes: &[u8],
        authenticator: &dyn Authenticator,
        dispatcher: &Dispatcher<SessionContext>,
    ) -> Result<usize> {
        if self.is_closing() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.inbound.append(bytes);
        let result = self.process(authenticator, dispatcher);
        self.inbound.compact();
        result
    }

    fn process(
        &mut self,
        authenticator: &dyn Authenticator,
        dispatcher: &Dispatcher<SessionContext>,
    ) -> Result<usize> {
        while self.handshake.stage() != LoginStage::LoggedIn {
            match self.handshake.advance(&mut self.inbound, authenticator)? {
                HandshakeStep::NeedMore => return Ok(0),
                HandshakeStep::ServerKey(reply) => self.outbound.push(reply),
                HandshakeStep::Authenticated(success) => {
                    let success = *success;
                    let mut ciphers = success.ciphers;
                    let player = PlayerState::new(self.slot, success.credentials.username);

                    self.outbound.push(success.frame);
                    self.outbound
                        .extend(outgoing::post_login_burst(ciphers.encrypt.as_mut(), &player)?);

                    info!(slot = self.slot, username = %player.username, "player logged in");
                    self.decrypt = Some(ciphers.decrypt);
                    self.context = Some(SessionContext::new(player, ciphers.encrypt));
                }
                HandshakeStep::Rejected { response, reason } => {
                    self.outbound.push(response);
                    return Err(ProtocolError::LoginRejected(reason));
                }
            }
        }

        match (self.decrypt.as_mut(), self.context.as_mut()) {
            (Some(decrypt), Some(context)) => dispatcher.drain(
                &mut self.decoder,
                &mut self.inbound,
                decrypt.as_mut(),
                context,
            ),
            _ => Err(ProtocolError::UnexpectedStage {
                expected: LoginStage::LoggedIn,
                actual: self.handshake.stage(),
            }),
        }
    }

    /// Run one game cycle: queue the player update of a logged-in session.
    pub fn tick(&mut self) -> Result<()> {
        if let Some(context) = self.context.as_mut() {
            let frame = outgoing::player_update(context.encrypt.as_mut(), &context.player)?;
            context.send(frame);
            context.player.update_required = false;
        }
        Ok(())
    }

    /// Frames to write, in the order they were queued.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        let mut frames = std::mem::take(&mut self.outbound);
        if let Some(context) = self.context.as_mut() {
            frames.append(&mut context.outbound);
        }
        frames
    }
}

impl<R> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("slot", &self.slot)
            .field("handshake", &self.handshake)
            .field("decoder", &self.decoder)
            .field("buffered", &self.inbound.remaining())
            .finish_non_exhaustive()
    }
}
