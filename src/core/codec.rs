//! # Packet Codec
//!
//! Value encodings and packet framing on top of [`ByteBuffer`].
//!
//! ## Value transforms
//! Each byte of a value may be written with one of four transforms:
//!
//! | Type       | Write          | Read           |
//! |------------|----------------|----------------|
//! | `Standard` | `v`            | `v`            |
//! | `A`        | `v + 128`      | `v - 128`      |
//! | `C`        | `-v`           | `-v`           |
//! | `S`        | `128 - v`      | `128 - v`      |
//!
//! All arithmetic wraps at 8 bits.
//!
//! ## Byte orders
//! Multi-byte values are written byte by byte in a fixed order, and the transform
//! is applied to the byte carrying bits 0-7 only:
//!
//! ```text
//! short  Big            [8] [0*]
//! short  Little         [0*] [8]
//! int    Big            [24] [16] [8] [0*]
//! int    Little         [0*] [8] [16] [24]
//! int    Middle         [8] [0*] [24] [16]
//! int    InverseMiddle  [16] [24] [0*] [8]
//! long   Big            [56] [48] [40] [32] [24] [16] [8] [0*]
//! long   Little         [0*] [8] [16] [24] [32] [40] [48] [56]
//! ```
//!
//! The middle orders are only defined for 4-byte values; requesting them for
//! other widths returns [`ProtocolError::UnsupportedByteOrder`].
//!
//! ## Framing
//! ```text
//! fixed          [opcode + key]
//! variable byte  [opcode + key] [len u8]  [payload]
//! variable short [opcode + key] [len u16] [payload]
//! ```
//! The length placeholder is written before the payload and patched in place by
//! [`PacketWriter::finish_variable_header`].

use bytes::Bytes;

use crate::core::buffer::{AccessMode, ByteBuffer};
use crate::core::isaac::OpcodeCipher;
use crate::error::{ProtocolError, Result};

/// Terminator byte of a protocol string.
pub const STRING_TERMINATOR: u8 = 10;

/// Per-byte arithmetic transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    Standard,
    A,
    C,
    S,
}

impl ValueType {
    /// Apply the transform to a byte about to be written.
    #[inline]
    pub fn encode(self, value: u8) -> u8 {
        match self {
            ValueType::Standard => value,
            ValueType::A => value.wrapping_add(128),
            ValueType::C => value.wrapping_neg(),
            ValueType::S => 128u8.wrapping_sub(value),
        }
    }

    /// Undo the transform on a byte that was read.
    #[inline]
    pub fn decode(self, value: u8) -> u8 {
        match self {
            ValueType::Standard => value,
            ValueType::A => value.wrapping_sub(128),
            ValueType::C => value.wrapping_neg(),
            ValueType::S => 128u8.wrapping_sub(value),
        }
    }
}

/// Byte ordering of a multi-byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
    Middle,
    InverseMiddle,
}

/// One byte of a multi-byte value: the shift selecting it and whether the value
/// transform applies to it.
type ByteSlot = (u32, bool);

const SHORT_BIG: [ByteSlot; 2] = [(8, false), (0, true)];
const SHORT_LITTLE: [ByteSlot; 2] = [(0, true), (8, false)];
const INT_BIG: [ByteSlot; 4] = [(24, false), (16, false), (8, false), (0, true)];
const INT_LITTLE: [ByteSlot; 4] = [(0, true), (8, false), (16, false), (24, false)];
const INT_MIDDLE: [ByteSlot; 4] = [(8, false), (0, true), (24, false), (16, false)];
const INT_INVERSE_MIDDLE: [ByteSlot; 4] = [(16, false), (24, false), (0, true), (8, false)];
const LONG_BIG: [ByteSlot; 8] = [
    (56, false),
    (48, false),
    (40, false),
    (32, false),
    (24, false),
    (16, false),
    (8, false),
    (0, true),
];
const LONG_LITTLE: [ByteSlot; 8] = [
    (0, true),
    (8, false),
    (16, false),
    (24, false),
    (32, false),
    (40, false),
    (48, false),
    (56, false),
];

/// Byte layout of a `width`-byte value in `order`.
pub fn byte_layout(width: usize, order: ByteOrder) -> Result<&'static [ByteSlot]> {
    let layout: &'static [ByteSlot] = match (width, order) {
        (2, ByteOrder::Big) => &SHORT_BIG,
        (2, ByteOrder::Little) => &SHORT_LITTLE,
        (4, ByteOrder::Big) => &INT_BIG,
        (4, ByteOrder::Little) => &INT_LITTLE,
        (4, ByteOrder::Middle) => &INT_MIDDLE,
        (4, ByteOrder::InverseMiddle) => &INT_INVERSE_MIDDLE,
        (8, ByteOrder::Big) => &LONG_BIG,
        (8, ByteOrder::Little) => &LONG_LITTLE,
        _ => return Err(ProtocolError::UnsupportedByteOrder { width, order }),
    };
    Ok(layout)
}

/// Size of the length placeholder of a variable-length packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    Byte,
    Short,
}

impl LengthPrefix {
    pub fn width(self) -> usize {
        match self {
            LengthPrefix::Byte => 1,
            LengthPrefix::Short => 2,
        }
    }
}

/// Builds one outgoing packet.
#[derive(Debug)]
pub struct PacketWriter {
    buffer: ByteBuffer,
    length_slot: Option<(usize, LengthPrefix)>,
}

impl PacketWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ByteBuffer::new(capacity),
            length_slot: None,
        }
    }

    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    pub fn position(&self) -> usize {
        self.buffer.position()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Consume the writer and hand out the written bytes.
    pub fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self.buffer.as_slice())
    }

    /// Write an opcode obfuscated with the next key of `cipher`.
    pub fn write_header(&mut self, cipher: &mut dyn OpcodeCipher, opcode: u8) -> Result<()> {
        let key = cipher.next_key();
        self.buffer.write(opcode.wrapping_add(key as u8))
    }

    /// Write the header of a variable-length packet and reserve its length field.
    pub fn write_variable_header(
        &mut self,
        cipher: &mut dyn OpcodeCipher,
        opcode: u8,
        prefix: LengthPrefix,
    ) -> Result<()> {
        self.write_header(cipher, opcode)?;
        self.length_slot = Some((self.buffer.position(), prefix));
        match prefix {
            LengthPrefix::Byte => self.write_byte(0, ValueType::Standard),
            LengthPrefix::Short => self.write_short(0, ValueType::Standard, ByteOrder::Big),
        }
    }

    /// Patch the reserved length field with the payload size written since the
    /// header. Returns the payload size.
    pub fn finish_variable_header(&mut self) -> Result<usize> {
        let (offset, prefix) = self.length_slot.take().ok_or(ProtocolError::Custom(
            "finish_variable_header called without a variable header".to_string(),
        ))?;
        let length = self.buffer.position() - offset - prefix.width();
        match prefix {
            LengthPrefix::Byte => {
                if length > u8::MAX as usize {
                    return Err(ProtocolError::UnexpectedPacketSize {
                        expected: u8::MAX as usize,
                        received: length,
                    });
                }
                self.buffer.put(offset, length as u8)?;
            }
            LengthPrefix::Short => {
                if length > u16::MAX as usize {
                    return Err(ProtocolError::UnexpectedPacketSize {
                        expected: u16::MAX as usize,
                        received: length,
                    });
                }
                self.buffer.put(offset, (length >> 8) as u8)?;
                self.buffer.put(offset + 1, length as u8)?;
            }
        }
        Ok(length)
    }

    pub fn write_byte(&mut self, value: i32, value_type: ValueType) -> Result<()> {
        self.buffer.write(value_type.encode(value as u8))
    }

    pub fn write_short(&mut self, value: i32, value_type: ValueType, order: ByteOrder) -> Result<()> {
        self.write_value(i64::from(value), 2, value_type, order)
    }

    pub fn write_int(&mut self, value: i32, value_type: ValueType, order: ByteOrder) -> Result<()> {
        self.write_value(i64::from(value), 4, value_type, order)
    }

    pub fn write_long(&mut self, value: i64, value_type: ValueType, order: ByteOrder) -> Result<()> {
        self.write_value(value, 8, value_type, order)
    }

    fn write_value(
        &mut self,
        value: i64,
        width: usize,
        value_type: ValueType,
        order: ByteOrder,
    ) -> Result<()> {
        for &(shift, transformed) in byte_layout(width, order)? {
            let byte = (value >> shift) as u8;
            let byte = if transformed {
                value_type.encode(byte)
            } else {
                byte
            };
            self.buffer.write(byte)?;
        }
        Ok(())
    }

    /// Write a newline-terminated string. The terminator byte may not occur in
    /// the string itself.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        if let Some(offset) = value.bytes().position(|b| b == STRING_TERMINATOR) {
            return Err(ProtocolError::StringContainsTerminator(offset));
        }
        self.write_bytes(value.as_bytes())?;
        self.buffer.write(STRING_TERMINATOR)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.buffer.write(b)?;
        }
        Ok(())
    }

    pub fn write_bytes_reverse(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes.iter().rev() {
            self.buffer.write(b)?;
        }
        Ok(())
    }

    pub fn set_access_mode(&mut self, mode: AccessMode) {
        self.buffer.set_access_mode(mode);
    }

    pub fn write_bits(&mut self, count: u32, value: u32) -> Result<()> {
        self.buffer.write_bits(count, value)
    }

    pub fn write_bit(&mut self, flag: bool) -> Result<()> {
        self.buffer.write_bits(1, u32::from(flag))
    }
}

/// Decodes values from a borrowed buffer, advancing its cursor.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buffer: &'a mut ByteBuffer,
}

impl<'a> PacketReader<'a> {
    pub fn new(buffer: &'a mut ByteBuffer) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn position(&self) -> usize {
        self.buffer.position()
    }

    /// Move the cursor back to an earlier position.
    pub fn rewind(&mut self, position: usize) -> Result<()> {
        self.buffer.set_position(position)
    }

    pub fn read_byte(&mut self, value_type: ValueType) -> Result<u8> {
        Ok(value_type.decode(self.buffer.read()?))
    }

    pub fn read_signed_byte(&mut self, value_type: ValueType) -> Result<i8> {
        Ok(self.read_byte(value_type)? as i8)
    }

    pub fn read_short(&mut self, value_type: ValueType, order: ByteOrder) -> Result<u16> {
        Ok(self.read_value(2, value_type, order)? as u16)
    }

    pub fn read_int(&mut self, value_type: ValueType, order: ByteOrder) -> Result<u32> {
        Ok(self.read_value(4, value_type, order)? as u32)
    }

    pub fn read_long(&mut self, value_type: ValueType, order: ByteOrder) -> Result<u64> {
        self.read_value(8, value_type, order)
    }

    fn read_value(&mut self, width: usize, value_type: ValueType, order: ByteOrder) -> Result<u64> {
        let layout = byte_layout(width, order)?;
        let bytes = self.buffer.read_slice(width)?;
        let mut value = 0u64;
        for (&(shift, transformed), &byte) in layout.iter().zip(bytes) {
            let byte = if transformed {
                value_type.decode(byte)
            } else {
                byte
            };
            value |= u64::from(byte) << shift;
        }
        Ok(value)
    }

    /// Read bytes up to the newline terminator. Non UTF-8 bytes are replaced.
    pub fn read_string(&mut self) -> Result<String> {
        let unread = self.buffer.unread();
        let end = unread
            .iter()
            .position(|&b| b == STRING_TERMINATOR)
            .ok_or(ProtocolError::UnterminatedString(unread.len()))?;
        let bytes = self.buffer.read_slice(end + 1)?;
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn read_bytes(&mut self, amount: usize, value_type: ValueType) -> Result<Vec<u8>> {
        let bytes = self.buffer.read_slice(amount)?;
        Ok(bytes.iter().map(|&b| value_type.decode(b)).collect())
    }

    pub fn read_bytes_reverse(&mut self, amount: usize, value_type: ValueType) -> Result<Vec<u8>> {
        let bytes = self.buffer.read_slice(amount)?;
        Ok(bytes.iter().rev().map(|&b| value_type.decode(b)).collect())
    }

    pub fn skip(&mut self, amount: usize) -> Result<()> {
        self.buffer.read_slice(amount).map(|_| ())
    }

    pub fn set_access_mode(&mut self, mode: AccessMode) {
        self.buffer.set_access_mode(mode);
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        self.buffer.read_bits(count)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.buffer.read_bits(1)? == 1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::isaac::NullCipher;
    use crate::error::ErrorCategory;

    fn read_back(writer: &PacketWriter) -> ByteBuffer {
        ByteBuffer::from_bytes(writer.as_bytes())
    }

    #[test]
    fn test_transforms_are_reversible() {
        for vt in [ValueType::Standard, ValueType::A, ValueType::C, ValueType::S] {
            for v in 0..=u8::MAX {
                assert_eq!(vt.decode(vt.encode(v)), v, "{vt:?} {v}");
            }
        }
        assert_eq!(ValueType::A.encode(1), 129);
        assert_eq!(ValueType::C.encode(1), 255);
        assert_eq!(ValueType::S.encode(1), 127);
    }

    #[test]
    fn test_int_orders_on_the_wire() {
        let value = 0x0102_0304;
        let cases = [
            (ByteOrder::Big, [1u8, 2, 3, 4 + 128]),
            (ByteOrder::Little, [4 + 128, 3, 2, 1]),
            (ByteOrder::Middle, [3, 4 + 128, 1, 2]),
            (ByteOrder::InverseMiddle, [2, 1, 4 + 128, 3]),
        ];
        for (order, expected) in cases {
            let mut writer = PacketWriter::new(4);
            writer.write_int(value, ValueType::A, order).unwrap();
            assert_eq!(writer.as_bytes(), &expected, "{order:?}");
        }
    }

    #[test]
    fn test_short_and_long_layouts() {
        let mut writer = PacketWriter::new(10);
        writer
            .write_short(0x1234, ValueType::Standard, ByteOrder::Little)
            .unwrap();
        writer
            .write_long(0x0102_0304_0506_0708, ValueType::Standard, ByteOrder::Big)
            .unwrap();
        assert_eq!(
            writer.as_bytes(),
            &[0x34, 0x12, 1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_middle_orders_rejected_outside_ints() {
        let mut writer = PacketWriter::new(8);
        assert!(matches!(
            writer.write_short(1, ValueType::Standard, ByteOrder::Middle),
            Err(ProtocolError::UnsupportedByteOrder { width: 2, .. })
        ));
        assert!(matches!(
            writer.write_long(1, ValueType::Standard, ByteOrder::InverseMiddle),
            Err(ProtocolError::UnsupportedByteOrder { width: 8, .. })
        ));
    }

    #[test]
    fn test_values_read_back() {
        let mut writer = PacketWriter::new(32);
        writer.write_byte(200, ValueType::S).unwrap();
        writer
            .write_short(0xBEEF, ValueType::C, ByteOrder::Little)
            .unwrap();
        writer
            .write_int(-2, ValueType::A, ByteOrder::InverseMiddle)
            .unwrap();
        writer
            .write_long(-1, ValueType::S, ByteOrder::Little)
            .unwrap();

        let mut buffer = read_back(&writer);
        let mut reader = PacketReader::new(&mut buffer);
        assert_eq!(reader.read_byte(ValueType::S).unwrap(), 200);
        assert_eq!(
            reader.read_short(ValueType::C, ByteOrder::Little).unwrap(),
            0xBEEF
        );
        assert_eq!(
            reader
                .read_int(ValueType::A, ByteOrder::InverseMiddle)
                .unwrap(),
            u32::MAX - 1
        );
        assert_eq!(
            reader.read_long(ValueType::S, ByteOrder::Little).unwrap(),
            u64::MAX
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_string_terminator() {
        let mut writer = PacketWriter::new(16);
        writer.write_string("zezima").unwrap();
        assert_eq!(writer.as_bytes().last(), Some(&STRING_TERMINATOR));
        assert!(matches!(
            writer.write_string("a\nb"),
            Err(ProtocolError::StringContainsTerminator(1))
        ));

        let mut buffer = read_back(&writer);
        let mut reader = PacketReader::new(&mut buffer);
        assert_eq!(reader.read_string().unwrap(), "zezima");

        let mut unterminated = ByteBuffer::from_bytes(b"abc");
        let mut reader = PacketReader::new(&mut unterminated);
        let err = reader.read_string().unwrap_err();
        assert!(matches!(err, ProtocolError::UnterminatedString(3)));
        assert_eq!(err.category(), ErrorCategory::Framing);
        assert!(!err.to_string().contains("login"));
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn test_variable_headers_are_patched() {
        let mut cipher = NullCipher;

        let mut writer = PacketWriter::new(16);
        writer
            .write_variable_header(&mut cipher, 4, LengthPrefix::Byte)
            .unwrap();
        writer.write_bytes(&[9, 9, 9]).unwrap();
        assert_eq!(writer.finish_variable_header().unwrap(), 3);
        assert_eq!(writer.as_bytes(), &[4, 3, 9, 9, 9]);

        let mut writer = PacketWriter::new(300);
        writer
            .write_variable_header(&mut cipher, 53, LengthPrefix::Short)
            .unwrap();
        writer.write_bytes(&[0u8; 260]).unwrap();
        assert_eq!(writer.finish_variable_header().unwrap(), 260);
        assert_eq!(&writer.as_bytes()[..3], &[53, 1, 4]);

        assert!(writer.finish_variable_header().is_err());
    }

    #[test]
    fn test_reverse_bytes() {
        let mut writer = PacketWriter::new(3);
        writer.write_bytes_reverse(&[1, 2, 3]).unwrap();
        assert_eq!(writer.as_bytes(), &[3, 2, 1]);

        let mut buffer = read_back(&writer);
        let mut reader = PacketReader::new(&mut buffer);
        assert_eq!(
            reader.read_bytes_reverse(3, ValueType::Standard).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_bit_block_with_trailing_bytes() {
        let mut writer = PacketWriter::new(8);
        writer.set_access_mode(AccessMode::Bit);
        writer.write_bit(true).unwrap();
        writer.write_bits(11, 2047).unwrap();
        writer.set_access_mode(AccessMode::Byte);
        writer.write_byte(0x10, ValueType::Standard).unwrap();
        assert_eq!(writer.as_bytes(), &[0xFF, 0xF0, 0x10]);
    }
}
