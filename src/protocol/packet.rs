//! # Packets and the Incoming Length Table
//!
//! A decoded packet is its plain opcode plus a buffer holding exactly its payload.
//! Incoming packets carry no length field unless their opcode is listed as
//! variable in [`INCOMING_LENGTHS`], in which case a single length byte follows
//! the opcode.

use crate::core::buffer::ByteBuffer;
use crate::core::codec::PacketReader;

/// Payload length of an incoming opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    /// Exactly this many payload bytes follow the opcode.
    Fixed(u8),
    /// A one-byte length field follows the opcode.
    Variable,
}

/// Opcode to payload length mapping covering all 256 opcodes.
#[derive(Debug, Clone, Copy)]
pub struct PacketLengthTable {
    lengths: [PacketLength; 256],
}

impl PacketLengthTable {
    /// Table with every opcode variable.
    pub const fn all_variable() -> Self {
        Self {
            lengths: [PacketLength::Variable; 256],
        }
    }

    /// Override the length of `opcode`.
    pub const fn with(mut self, opcode: u8, length: PacketLength) -> Self {
        self.lengths[opcode as usize] = length;
        self
    }

    const fn fixed(self, opcode: u8, length: u8) -> Self {
        self.with(opcode, PacketLength::Fixed(length))
    }

    #[inline]
    pub fn length(&self, opcode: u8) -> PacketLength {
        self.lengths[opcode as usize]
    }
}

impl Default for PacketLengthTable {
    fn default() -> Self {
        INCOMING_LENGTHS
    }
}

/// Lengths of the client packets this server knows about. Every other opcode is
/// treated as variable.
pub static INCOMING_LENGTHS: PacketLengthTable = PacketLengthTable::all_variable()
    .fixed(0, 0) // keep-alive
    .fixed(3, 1) // focus change
    .fixed(40, 2) // dialogue continue
    .fixed(41, 6) // equip item
    .fixed(86, 4) // camera movement
    .fixed(87, 6) // drop item
    .fixed(95, 3) // privacy options
    .fixed(121, 0) // region loaded
    .fixed(122, 6) // first item option
    .fixed(130, 0) // close interface
    .fixed(145, 6) // remove item
    .fixed(185, 2) // button click
    .fixed(202, 0) // idle logout
    .fixed(210, 4) // region change
    .fixed(214, 7) // move item
    .fixed(236, 6) // pick up ground item
    .fixed(241, 4); // mouse click

/// A framed incoming packet.
#[derive(Debug)]
pub struct Packet {
    opcode: u8,
    payload: ByteBuffer,
}

impl Packet {
    pub fn new(opcode: u8, payload: &[u8]) -> Self {
        Self {
            opcode,
            payload: ByteBuffer::from_bytes(payload),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Reader positioned at the unread part of the payload.
    pub fn reader(&mut self) -> PacketReader<'_> {
        PacketReader::new(&mut self.payload)
    }
}
