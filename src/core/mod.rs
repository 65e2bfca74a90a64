//! # Core Protocol Components
//!
//! Byte-level building blocks shared by every connection.
//!
//! ## Components
//! - **Buffer**: cursor-based byte container with a bit-addressed mode
//! - **Codec**: transformed value encodings and packet framing
//! - **Isaac**: opcode keystream cipher
//!
//! ## Wire Format
//! ```text
//! [Opcode + key(1)] [Length(0, 1 or 2)] [Payload(N)]
//! ```
//!
//! Whether a length field is present is decided per opcode by the
//! [`crate::protocol::packet::PacketLengthTable`].

pub mod buffer;
pub mod codec;
pub mod isaac;
