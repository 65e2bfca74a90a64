//! # Byte Buffer
//!
//! A growable byte container with an explicit cursor, a high-water mark and a
//! second, bit-addressed cursor used for densely packed fields.
//!
//! ## Layout
//! ```text
//! 0            position          limit            capacity
//! |---consumed---|-----unread------|-----unused------|
//! ```
//!
//! - `position` is the sequential read/write cursor
//! - `limit` is the high-water mark: the number of bytes holding data
//! - `capacity` is the size of the backing storage
//!
//! `position <= limit <= capacity` holds after every operation.
//!
//! ## Access modes
//! The buffer is either in [`AccessMode::Byte`] (the default) or
//! [`AccessMode::Bit`]. Sequential byte access is only legal in byte mode and bit
//! field access only in bit mode; a violation returns
//! [`ProtocolError::IllegalAccessMode`] instead of corrupting state. Entering bit
//! mode sets the bit cursor to `position * 8`, leaving it sets
//! `position = ceil(bit_position / 8)`.
//!
//! ## Usage
//! ```rust
//! use game_protocol::core::buffer::{AccessMode, ByteBuffer};
//!
//! let mut buffer = ByteBuffer::new(4);
//! buffer.write(0xAB).unwrap();
//! buffer.set_access_mode(AccessMode::Bit);
//! buffer.write_bits(3, 0b101).unwrap();
//! buffer.set_access_mode(AccessMode::Byte);
//! assert_eq!(buffer.as_slice(), &[0xAB, 0b1010_0000]);
//! ```

use crate::error::{ProtocolError, Result};

/// `BIT_MASKS[n]` has the low `n` bits set.
pub const BIT_MASKS: [u32; 33] = {
    let mut masks = [0u32; 33];
    let mut i = 1;
    while i < 33 {
        masks[i] = if i == 32 { u32::MAX } else { (1u32 << i) - 1 };
        i += 1;
    }
    masks
};

/// Addressing granularity of a [`ByteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Whole-byte sequential access.
    #[default]
    Byte,
    /// Bit-field access through the bit cursor.
    Bit,
}

/// Cursor-based byte buffer with a bit-access mode.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    buf: Vec<u8>,
    position: usize,
    limit: usize,
    initial_capacity: usize,
    mode: AccessMode,
    bit_position: usize,
}

impl ByteBuffer {
    /// Create an empty buffer with a fixed initial capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            position: 0,
            limit: 0,
            initial_capacity: capacity,
            mode: AccessMode::Byte,
            bit_position: 0,
        }
    }

    /// Create a buffer holding `bytes`, with the cursor at the start.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: bytes.to_vec(),
            position: 0,
            limit: bytes.len(),
            initial_capacity: bytes.len(),
            mode: AccessMode::Byte,
            bit_position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Positions past the high-water mark are rejected.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(ProtocolError::OutOfBounds {
                index: position,
                capacity: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    /// Number of bytes holding data (the high-water mark).
    pub fn len(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes between the cursor and the high-water mark.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    pub fn bit_position(&self) -> usize {
        self.bit_position
    }

    /// All bytes holding data.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.limit]
    }

    /// Bytes not yet consumed by the cursor.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.position..self.limit]
    }

    /// Write one byte at the cursor.
    pub fn write(&mut self, value: u8) -> Result<()> {
        self.require_mode(AccessMode::Byte)?;
        self.check_index(self.position)?;
        self.buf[self.position] = value;
        self.position += 1;
        self.limit = self.limit.max(self.position);
        Ok(())
    }

    /// Read one byte at the cursor.
    pub fn read(&mut self) -> Result<u8> {
        self.require_mode(AccessMode::Byte)?;
        if self.position >= self.limit {
            return Err(ProtocolError::BufferUnderflow {
                needed: 1,
                available: 0,
            });
        }
        let value = self.buf[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Read `amount` bytes at the cursor, all or nothing.
    pub fn read_slice(&mut self, amount: usize) -> Result<&[u8]> {
        self.require_mode(AccessMode::Byte)?;
        if self.remaining() < amount {
            return Err(ProtocolError::BufferUnderflow {
                needed: amount,
                available: self.remaining(),
            });
        }
        let start = self.position;
        self.position += amount;
        Ok(&self.buf[start..self.position])
    }

    /// Random-access read, bounds-checked against capacity.
    pub fn get(&self, offset: usize) -> Result<u8> {
        self.check_index(offset)?;
        Ok(self.buf[offset])
    }

    /// Random-access write used to patch bytes that were already written.
    pub fn put(&mut self, offset: usize, value: u8) -> Result<()> {
        self.check_index(offset)?;
        self.buf[offset] = value;
        Ok(())
    }

    /// Reallocate to `capacity`, keeping existing bytes. The cursor and the
    /// high-water mark are truncated when they no longer fit.
    pub fn resize(&mut self, capacity: usize) {
        self.buf.resize(capacity, 0);
        self.limit = self.limit.min(capacity);
        self.position = self.position.min(capacity);
        self.bit_position = self.bit_position.min(capacity * 8);
    }

    /// Append bytes after the high-water mark, growing when necessary. The cursor
    /// does not move.
    pub fn append(&mut self, bytes: &[u8]) {
        let end = self.limit + bytes.len();
        if end > self.capacity() {
            self.resize(end);
        }
        self.buf[self.limit..end].copy_from_slice(bytes);
        self.limit = end;
    }

    /// Drop consumed bytes, move the unread ones to offset 0 and restore the
    /// initial capacity. Unread bytes are never truncated: when they exceed the
    /// initial capacity the buffer stays as large as they need.
    pub fn compact(&mut self) {
        self.buf.copy_within(self.position..self.limit, 0);
        self.limit -= self.position;
        self.position = 0;
        self.bit_position = 0;
        self.resize(self.initial_capacity.max(self.limit));
    }

    /// Forget all data and return the cursor to the start.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = 0;
        self.bit_position = 0;
        self.mode = AccessMode::Byte;
    }

    /// Switch between byte and bit addressing, realigning the cursors.
    /// Switching to the current mode leaves both cursors untouched.
    pub fn set_access_mode(&mut self, mode: AccessMode) {
        if mode == self.mode {
            return;
        }
        match mode {
            AccessMode::Bit => self.bit_position = self.position * 8,
            AccessMode::Byte => {
                self.position = self.bit_position.div_ceil(8);
                self.limit = self.limit.max(self.position);
            }
        }
        self.mode = mode;
    }

    /// Write the low `count` bits of `value` at the bit cursor, most significant
    /// bit first. Bits outside the field keep their previous values.
    pub fn write_bits(&mut self, count: u32, value: u32) -> Result<()> {
        self.require_mode(AccessMode::Bit)?;
        if count == 0 || count > 32 {
            return Err(ProtocolError::InvalidBitCount(count));
        }

        let mut byte_pos = self.bit_position >> 3;
        let mut bit_offset = 8 - (self.bit_position & 7) as u32;
        let end_bit = self.bit_position + count as usize;
        let required = end_bit.div_ceil(8);
        if required > self.capacity() {
            self.resize(required);
        }
        self.bit_position = end_bit;

        let mut amount = count;
        while amount > bit_offset {
            let mut byte = self.buf[byte_pos];
            byte &= !(BIT_MASKS[bit_offset as usize] as u8);
            byte |= ((value >> (amount - bit_offset)) & BIT_MASKS[bit_offset as usize]) as u8;
            self.buf[byte_pos] = byte;
            byte_pos += 1;
            amount -= bit_offset;
            bit_offset = 8;
        }

        let mut byte = self.buf[byte_pos];
        if amount == bit_offset {
            byte &= !(BIT_MASKS[bit_offset as usize] as u8);
            byte |= (value & BIT_MASKS[bit_offset as usize]) as u8;
        } else {
            let shift = bit_offset - amount;
            byte &= !((BIT_MASKS[amount as usize] << shift) as u8);
            byte |= ((value & BIT_MASKS[amount as usize]) << shift) as u8;
        }
        self.buf[byte_pos] = byte;

        self.limit = self.limit.max(required);
        Ok(())
    }

    /// Read a `count`-bit field at the bit cursor, most significant bit first.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        self.require_mode(AccessMode::Bit)?;
        if count == 0 || count > 32 {
            return Err(ProtocolError::InvalidBitCount(count));
        }

        let end_bit = self.bit_position + count as usize;
        let required = end_bit.div_ceil(8);
        if required > self.limit {
            return Err(ProtocolError::BufferUnderflow {
                needed: required - self.bit_position / 8,
                available: self.limit - self.bit_position / 8,
            });
        }

        let mut byte_pos = self.bit_position >> 3;
        let mut bit_offset = 8 - (self.bit_position & 7) as u32;
        self.bit_position = end_bit;

        let mut value = 0u32;
        let mut amount = count;
        while amount > bit_offset {
            let bits = u32::from(self.buf[byte_pos]) & BIT_MASKS[bit_offset as usize];
            value |= bits << (amount - bit_offset);
            byte_pos += 1;
            amount -= bit_offset;
            bit_offset = 8;
        }

        let byte = u32::from(self.buf[byte_pos]);
        if amount == bit_offset {
            value |= byte & BIT_MASKS[bit_offset as usize];
        } else {
            value |= (byte >> (bit_offset - amount)) & BIT_MASKS[amount as usize];
        }
        Ok(value)
    }

    fn require_mode(&self, expected: AccessMode) -> Result<()> {
        if self.mode != expected {
            return Err(ProtocolError::IllegalAccessMode {
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.capacity() {
            return Err(ProtocolError::OutOfBounds {
                index,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_write_read() {
        let mut buffer = ByteBuffer::new(4);
        buffer.write(1).unwrap();
        buffer.write(2).unwrap();
        assert_eq!(buffer.len(), 2);

        buffer.set_position(0).unwrap();
        assert_eq!(buffer.read().unwrap(), 1);
        assert_eq!(buffer.read().unwrap(), 2);
        assert!(matches!(
            buffer.read(),
            Err(ProtocolError::BufferUnderflow { needed: 1, .. })
        ));
    }

    #[test]
    fn test_write_past_capacity() {
        let mut buffer = ByteBuffer::new(1);
        buffer.write(9).unwrap();
        assert!(matches!(
            buffer.write(9),
            Err(ProtocolError::OutOfBounds {
                index: 1,
                capacity: 1
            })
        ));
    }

    #[test]
    fn test_put_patches_without_moving_cursor() {
        let mut buffer = ByteBuffer::new(3);
        buffer.write(0).unwrap();
        buffer.write(5).unwrap();
        buffer.put(0, 42).unwrap();
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.get(0).unwrap(), 42);
        assert!(buffer.put(3, 1).is_err());
    }

    #[test]
    fn test_resize_truncates_cursor() {
        let mut buffer = ByteBuffer::new(8);
        for b in 0..6 {
            buffer.write(b).unwrap();
        }
        buffer.resize(4);
        assert_eq!(buffer.position(), 4);
        assert_eq!(buffer.as_slice(), &[0, 1, 2, 3]);

        buffer.resize(16);
        buffer.resize(16);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_compact_keeps_unread_bytes() {
        let mut buffer = ByteBuffer::new(4);
        buffer.append(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.capacity(), 6);
        buffer.read().unwrap();
        buffer.read().unwrap();
        buffer.read().unwrap();

        buffer.compact();
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.unread(), &[4, 5, 6]);
        assert_eq!(buffer.capacity(), 4);

        buffer.append(&[7, 8]);
        assert_eq!(buffer.unread(), &[4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_mode_violations() {
        let mut buffer = ByteBuffer::new(4);
        assert!(matches!(
            buffer.write_bits(1, 1),
            Err(ProtocolError::IllegalAccessMode {
                expected: AccessMode::Bit,
                actual: AccessMode::Byte
            })
        ));
        buffer.set_access_mode(AccessMode::Bit);
        assert!(matches!(
            buffer.write(1),
            Err(ProtocolError::IllegalAccessMode { .. })
        ));
        assert!(matches!(
            buffer.write_bits(33, 1),
            Err(ProtocolError::InvalidBitCount(33))
        ));
    }

    #[test]
    fn test_bits_straddle_bytes() {
        let mut buffer = ByteBuffer::new(1);
        buffer.set_access_mode(AccessMode::Bit);
        buffer.write_bits(1, 1).unwrap();
        buffer.write_bits(2, 3).unwrap();
        buffer.write_bits(7, 0x55).unwrap();
        buffer.set_access_mode(AccessMode::Byte);

        // 1 11 1010101 -> 1111_0101 01xx_xxxx
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.as_slice(), &[0b1111_0101, 0b0100_0000]);
    }

    #[test]
    fn test_bits_preserve_neighbours() {
        let mut buffer = ByteBuffer::from_bytes(&[0xFF, 0xFF]);
        buffer.set_access_mode(AccessMode::Bit);
        buffer.write_bits(4, 0).unwrap();
        buffer.write_bits(8, 0).unwrap();
        assert_eq!(buffer.as_slice(), &[0x00, 0x0F]);
    }

    #[test]
    fn test_mode_switch_realigns() {
        let mut buffer = ByteBuffer::new(8);
        buffer.write(0).unwrap();
        buffer.set_access_mode(AccessMode::Bit);
        assert_eq!(buffer.bit_position(), 8);
        buffer.write_bits(9, 0x1FF).unwrap();
        buffer.set_access_mode(AccessMode::Byte);
        assert_eq!(buffer.position(), 3);
        buffer.write(7).unwrap();
        assert_eq!(buffer.as_slice(), &[0, 0xFF, 0x80, 7]);
    }

    #[test]
    fn test_repeated_mode_switch_keeps_cursors() {
        let mut buffer = ByteBuffer::new(4);
        for b in [1, 2, 3] {
            buffer.write(b).unwrap();
        }
        buffer.set_access_mode(AccessMode::Byte);
        buffer.write(9).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 9]);

        let mut buffer = ByteBuffer::new(2);
        buffer.set_access_mode(AccessMode::Bit);
        buffer.write_bits(8, 0xAB).unwrap();
        buffer.set_access_mode(AccessMode::Bit);
        buffer.write_bits(8, 0xCD).unwrap();
        buffer.set_access_mode(AccessMode::Byte);
        assert_eq!(buffer.as_slice(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_read_bits_matches_written() {
        let mut buffer = ByteBuffer::new(8);
        buffer.set_access_mode(AccessMode::Bit);
        buffer.write_bits(3, 5).unwrap();
        buffer.write_bits(32, 0xDEAD_BEEF).unwrap();
        buffer.write_bits(11, 2047).unwrap();
        buffer.set_access_mode(AccessMode::Byte);

        buffer.set_position(0).unwrap();
        buffer.set_access_mode(AccessMode::Bit);
        assert_eq!(buffer.read_bits(3).unwrap(), 5);
        assert_eq!(buffer.read_bits(32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(buffer.read_bits(11).unwrap(), 2047);
        assert!(buffer.read_bits(8).is_err());
    }

    #[test]
    fn test_bit_masks() {
        assert_eq!(BIT_MASKS[0], 0);
        assert_eq!(BIT_MASKS[1], 1);
        assert_eq!(BIT_MASKS[11], 0x7FF);
        assert_eq!(BIT_MASKS[32], u32::MAX);
    }
}
