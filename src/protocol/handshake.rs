//! # Login Handshake
//!
//! Upgrades a raw connection into an authenticated session.
//!
//! The handshake never touches a socket: [`Handshake::advance`] consumes bytes
//! from the connection's inbound buffer and returns a [`HandshakeStep`] telling
//! the caller what to write back. State is kept per connection, so one
//! [`Handshake`] value drives exactly one login.
//!
//! ## Stages
//! ```text
//! Connected --(14, name hash)--> LoggingIn --(16|18, login block)--> LoggedIn
//! ```
//!
//! No transition leads backward. Any violation is fatal for the session.
//!
//! ## Login block
//! ```text
//! [request 16|18] [block len]
//!   [magic 255] [version u16 = 317] [memory]
//!   [crc int] x9
//!   [rsa len] [rsa opcode 10] [client key u64] [server key u64]
//!   [uid int] [username str] [password str]
//! ```
//! The whole block must be buffered before any of it is parsed. When fewer bytes
//! than declared are available the read cursor is rewound to the request byte
//! and the step reports [`HandshakeStep::NeedMore`].

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, instrument, warn};

use crate::config::constants::{
    LOGIN_MAGIC, PROTOCOL_VERSION, REQUEST_LOGIN, REQUEST_NEW_SESSION, REQUEST_RECONNECT,
    RSA_BLOCK_OPCODE,
};
use crate::core::buffer::ByteBuffer;
use crate::core::codec::{ByteOrder, PacketReader, PacketWriter, ValueType};
use crate::core::isaac::{CipherKind, CipherPair};
use crate::error::{constants, ProtocolError, Result};

/// Number of CRC words in the login block.
const CRC_COUNT: usize = 9;

/// Size of the reply to a new-session request.
pub const SERVER_KEY_RESPONSE_LEN: usize = 17;

/// Progress of a connection through the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginStage {
    #[default]
    Connected,
    LoggingIn,
    LoggedIn,
}

/// Status codes the client understands in reply to a login block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResponse {
    Success,
    InvalidCredentials,
    AccountDisabled,
    AlreadyOnline,
    GameUpdated,
    WorldFull,
    LoginServerOffline,
    LoginLimitExceeded,
    BadSessionId,
    CouldNotComplete,
    ServerUpdating,
}

impl LoginResponse {
    pub fn code(self) -> u8 {
        match self {
            LoginResponse::Success => 2,
            LoginResponse::InvalidCredentials => 3,
            LoginResponse::AccountDisabled => 4,
            LoginResponse::AlreadyOnline => 5,
            LoginResponse::GameUpdated => 6,
            LoginResponse::WorldFull => 7,
            LoginResponse::LoginServerOffline => 8,
            LoginResponse::LoginLimitExceeded => 9,
            LoginResponse::BadSessionId => 10,
            LoginResponse::CouldNotComplete => 13,
            LoginResponse::ServerUpdating => 14,
        }
    }
}

/// Credentials carried by a login block.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Vec<u8>,
    pub uid: u32,
    pub reconnecting: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("uid", &self.uid)
            .field("reconnecting", &self.reconnecting)
            .finish_non_exhaustive()
    }
}

/// What an accepted login is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoginGrant {
    pub rights: u8,
    pub flagged: bool,
}

/// Decides whether a set of credentials may log in.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> std::result::Result<LoginGrant, LoginResponse>;
}

/// Accepts every login with default rights.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn authenticate(&self, _credentials: &Credentials) -> std::result::Result<LoginGrant, LoginResponse> {
        Ok(LoginGrant::default())
    }
}

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginSuccess {
    pub credentials: Credentials,
    pub grant: LoginGrant,
    pub ciphers: CipherPair,
    /// `[2, rights, flagged]`, to be written before any game packet.
    pub frame: Bytes,
}

/// Outcome of one [`Handshake::advance`] call.
#[derive(Debug)]
pub enum HandshakeStep {
    /// Not enough bytes buffered; nothing was consumed.
    NeedMore,
    /// New session accepted; write the 17-byte reply carrying the server key.
    ServerKey(Bytes),
    /// Login accepted; the session is now logged in.
    Authenticated(Box<LoginSuccess>),
    /// Login refused; write `response` and close the connection.
    Rejected { response: Bytes, reason: LoginResponse },
}

/// Per-connection login state machine.
pub struct Handshake<R = StdRng> {
    stage: LoginStage,
    server_key: u64,
    cipher_kind: CipherKind,
    username: Option<String>,
    rng: R,
}

impl Handshake<StdRng> {
    /// Handshake drawing its server key from the operating system.
    pub fn new(cipher_kind: CipherKind) -> Self {
        Self::with_rng(cipher_kind, StdRng::from_os_rng())
    }
}

impl<R: RngCore> Handshake<R> {
    pub fn with_rng(cipher_kind: CipherKind, rng: R) -> Self {
        Self {
            stage: LoginStage::Connected,
            server_key: 0,
            cipher_kind,
            username: None,
            rng,
        }
    }

    pub fn stage(&self) -> LoginStage {
        self.stage
    }

    /// Username of the login block, once it has been parsed.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Server half of the key exchange sent to the client.
    pub fn server_key(&self) -> u64 {
        self.server_key
    }

    /// Consume as much of `inbound` as the current stage needs.
    #[instrument(level = "debug", skip_all, fields(stage = ?self.stage))]
    pub fn advance(
        &mut self,
        inbound: &mut ByteBuffer,
        authenticator: &dyn Authenticator,
    ) -> Result<HandshakeStep> {
        match self.stage {
            LoginStage::Connected => self.session_request(inbound),
            LoginStage::LoggingIn => self.login_block(inbound, authenticator),
            LoginStage::LoggedIn => Err(ProtocolError::UnexpectedStage {
                expected: LoginStage::LoggingIn,
                actual: LoginStage::LoggedIn,
            }),
        }
    }

    fn session_request(&mut self, inbound: &mut ByteBuffer) -> Result<HandshakeStep> {
        let mut reader = PacketReader::new(inbound);
        if reader.remaining() < 2 {
            return Ok(HandshakeStep::NeedMore);
        }

        let request = reader.read_byte(ValueType::Standard)?;
        let _name_hash = reader.read_byte(ValueType::Standard)?;
        if request != REQUEST_NEW_SESSION {
            return Err(ProtocolError::InvalidLoginRequest(request));
        }

        let mut key = [0u8; 8];
        self.rng.fill_bytes(&mut key);
        self.server_key = u64::from_be_bytes(key);

        let mut out = PacketWriter::new(SERVER_KEY_RESPONSE_LEN);
        out.write_long(0, ValueType::Standard, ByteOrder::Big)?;
        out.write_byte(0, ValueType::Standard)?;
        out.write_bytes(&key)?;

        self.stage = LoginStage::LoggingIn;
        debug!("session request accepted");
        Ok(HandshakeStep::ServerKey(out.into_bytes()))
    }

    fn login_block(
        &mut self,
        inbound: &mut ByteBuffer,
        authenticator: &dyn Authenticator,
    ) -> Result<HandshakeStep> {
        let mut reader = PacketReader::new(inbound);
        let mark = reader.position();
        if reader.remaining() < 2 {
            return Ok(HandshakeStep::NeedMore);
        }

        let request = reader.read_byte(ValueType::Standard)?;
        if request != REQUEST_LOGIN && request != REQUEST_RECONNECT {
            return Err(ProtocolError::InvalidLoginRequest(request));
        }

        let block_len = usize::from(reader.read_byte(ValueType::Standard)?);
        if reader.remaining() < block_len {
            reader.rewind(mark)?;
            return Ok(HandshakeStep::NeedMore);
        }

        let mut block = ByteBuffer::from_bytes(&reader.read_bytes(block_len, ValueType::Standard)?);
        let parsed = parse_login_block(&mut block, request == REQUEST_RECONNECT).map_err(|e| {
            match e {
                ProtocolError::BufferUnderflow { .. } => {
                    ProtocolError::MalformedHandshake(constants::ERR_BLOCK_OVERRUN)
                }
                ProtocolError::UnterminatedString(_) => {
                    ProtocolError::MalformedHandshake(constants::ERR_STRING_UNTERMINATED)
                }
                other => other,
            }
        })?;

        if parsed.server_key != self.server_key {
            warn!(
                expected = self.server_key,
                received = parsed.server_key,
                "login block echoes a different server key"
            );
        }

        let credentials = parsed.credentials;
        self.username = Some(credentials.username.clone());

        match authenticator.authenticate(&credentials) {
            Ok(grant) => {
                let ciphers = CipherPair::for_kind(self.cipher_kind, parsed.client_key, parsed.server_key);

                let mut frame = PacketWriter::new(3);
                frame.write_byte(i32::from(LoginResponse::Success.code()), ValueType::Standard)?;
                frame.write_byte(i32::from(grant.rights), ValueType::Standard)?;
                frame.write_byte(i32::from(grant.flagged), ValueType::Standard)?;

                self.stage = LoginStage::LoggedIn;
                debug!(username = %credentials.username, "login accepted");
                Ok(HandshakeStep::Authenticated(Box::new(LoginSuccess {
                    credentials,
                    grant,
                    ciphers,
                    frame: frame.into_bytes(),
                })))
            }
            Err(reason) => {
                debug!(username = %credentials.username, ?reason, "login rejected");
                Ok(HandshakeStep::Rejected {
                    response: Bytes::copy_from_slice(&[reason.code()]),
                    reason,
                })
            }
        }
    }
}

impl<R> std::fmt::Debug for Handshake<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("stage", &self.stage)
            .field("cipher_kind", &self.cipher_kind)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

struct LoginBlock {
    client_key: u64,
    server_key: u64,
    credentials: Credentials,
}

fn parse_login_block(block: &mut ByteBuffer, reconnecting: bool) -> Result<LoginBlock> {
    let mut reader = PacketReader::new(block);

    let magic = reader.read_byte(ValueType::Standard)?;
    if magic != LOGIN_MAGIC {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = reader.read_short(ValueType::Standard, ByteOrder::Big)?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let _memory = reader.read_byte(ValueType::Standard)?;
    for _ in 0..CRC_COUNT {
        reader.read_int(ValueType::Standard, ByteOrder::Big)?;
    }

    let _rsa_len = reader.read_byte(ValueType::Standard)?;
    if reader.read_byte(ValueType::Standard)? != RSA_BLOCK_OPCODE {
        return Err(ProtocolError::MalformedHandshake(constants::ERR_RSA_OPCODE));
    }

    let client_key = reader.read_long(ValueType::Standard, ByteOrder::Big)?;
    let server_key = reader.read_long(ValueType::Standard, ByteOrder::Big)?;

    let uid = reader.read_int(ValueType::Standard, ByteOrder::Big)?;
    let username = reader.read_string()?.trim().to_string();
    let password = reader.read_string()?.into_bytes();

    Ok(LoginBlock {
        client_key,
        server_key,
        credentials: Credentials {
            username,
            password,
            uid,
            reconnecting,
        },
    })
}
