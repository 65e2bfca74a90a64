//! # Packet Dispatch
//!
//! Two halves:
//! - [`PacketDecoder`] carves complete packets out of a connection's inbound
//!   buffer. It keeps the opcode and length of a partially received packet, so a
//!   read boundary anywhere inside a packet loses nothing.
//! - [`Dispatcher`] routes decoded packets to handlers registered per opcode.
//!
//! ```text
//! [opcode - key] [len]? [payload(len)]
//!        |          |
//!        |          +-- present only when the opcode is variable in the table
//!        +------------- one decrypt word consumed per packet
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::core::buffer::ByteBuffer;
use crate::core::codec::{PacketReader, ValueType};
use crate::core::isaac::OpcodeCipher;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::packet::{Packet, PacketLength, PacketLengthTable, INCOMING_LENGTHS};

/// Resumable framing state of one connection.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    table: PacketLengthTable,
    pending_opcode: Option<u8>,
    pending_length: Option<usize>,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new(INCOMING_LENGTHS)
    }
}

impl PacketDecoder {
    pub fn new(table: PacketLengthTable) -> Self {
        Self {
            table,
            pending_opcode: None,
            pending_length: None,
        }
    }

    pub fn pending_opcode(&self) -> Option<u8> {
        self.pending_opcode
    }

    pub fn pending_length(&self) -> Option<usize> {
        self.pending_length
    }

    /// Decode the next complete packet, or `None` when more bytes are needed.
    ///
    /// Bytes that were consumed stay consumed: an opcode or length read here is
    /// remembered until the rest of its packet arrives.
    pub fn decode(
        &mut self,
        inbound: &mut ByteBuffer,
        cipher: &mut dyn OpcodeCipher,
    ) -> Result<Option<Packet>> {
        let mut reader = PacketReader::new(inbound);

        let opcode = match self.pending_opcode {
            Some(opcode) => opcode,
            None => {
                if reader.remaining() == 0 {
                    return Ok(None);
                }
                let raw = reader.read_byte(ValueType::Standard)?;
                let opcode = raw.wrapping_sub(cipher.next_key() as u8);
                self.pending_opcode = Some(opcode);
                opcode
            }
        };

        let length = match self.pending_length {
            Some(length) => length,
            None => {
                let length = match self.table.length(opcode) {
                    PacketLength::Fixed(length) => usize::from(length),
                    PacketLength::Variable => {
                        if reader.remaining() == 0 {
                            return Ok(None);
                        }
                        usize::from(reader.read_byte(ValueType::Standard)?)
                    }
                };
                self.pending_length = Some(length);
                length
            }
        };

        if reader.remaining() < length {
            return Ok(None);
        }

        let payload = reader.read_bytes(length, ValueType::Standard)?;
        self.pending_opcode = None;
        self.pending_length = None;
        trace!(opcode, length, "packet decoded");
        Ok(Some(Packet::new(opcode, &payload)))
    }
}

type HandlerFn<C> = dyn Fn(&mut C, &mut Packet) -> Result<()> + Send + Sync + 'static;

/// Opcode handler registry, shared by every session of a server.
///
/// `C` is the per-session state handed to handlers.
pub struct Dispatcher<C> {
    handlers: Arc<RwLock<HashMap<u8, Box<HandlerFn<C>>>>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `handler` for `opcode`, replacing any previous handler.
    pub fn register<F>(&self, opcode: u8, handler: F) -> Result<()>
    where
        F: Fn(&mut C, &mut Packet) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(opcode, Box::new(handler));
        Ok(())
    }

    pub fn is_registered(&self, opcode: u8) -> Result<bool> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;
        Ok(handlers.contains_key(&opcode))
    }

    /// Hand `packet` to its handler. Packets without a handler are dropped.
    pub fn dispatch(&self, context: &mut C, packet: &mut Packet) -> Result<()> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        match handlers.get(&packet.opcode()) {
            Some(handler) => handler(context, packet),
            None => {
                trace!(opcode = packet.opcode(), len = packet.len(), "unhandled packet");
                Ok(())
            }
        }
    }

    /// Decode and dispatch every complete packet in `inbound`. Returns the number
    /// of packets dispatched.
    pub fn drain(
        &self,
        decoder: &mut PacketDecoder,
        inbound: &mut ByteBuffer,
        cipher: &mut dyn OpcodeCipher,
        context: &mut C,
    ) -> Result<usize> {
        let mut dispatched = 0;
        while let Some(mut packet) = decoder.decode(inbound, cipher)? {
            self.dispatch(context, &mut packet)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
