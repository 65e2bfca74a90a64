//! # Protocol Layer
//!
//! Login handshake, packet framing and dispatch, and the packets the server sends.
//!
//! ## Components
//! - **Packet**: decoded packets and the incoming length table
//! - **Handshake**: the `Connected -> LoggingIn -> LoggedIn` state machine
//! - **Dispatcher**: resumable packet decoder and opcode handler registry
//! - **Outgoing**: encoders for server packets
//! - **Session**: per-connection state tying the above together
//!
//! ## Flow
//! ```text
//! socket bytes -> Session::receive
//!                   |-- stage < LoggedIn : Handshake::advance
//!                   '-- LoggedIn         : PacketDecoder -> Dispatcher -> handler
//! Session::tick -> player update
//! Session::take_outbound -> socket
//! ```

pub mod dispatcher;
pub mod handshake;
pub mod outgoing;
pub mod packet;
pub mod session;

pub use dispatcher::{Dispatcher, PacketDecoder};
pub use handshake::{
    AcceptAll, Authenticator, Credentials, Handshake, HandshakeStep, LoginGrant, LoginResponse,
    LoginStage,
};
pub use packet::{Packet, PacketLength, PacketLengthTable};
pub use session::{Session, SessionContext};
