//! Client-side helpers shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use game_protocol::core::codec::{ByteOrder, PacketWriter, ValueType};
use game_protocol::core::isaac::{session_seed, IsaacCipher, OUTBOUND_SEED_OFFSET};

/// Client half of the key exchange used by every test client.
pub const CLIENT_KEY: u64 = 0x1122_3344_5566_7788;

/// Session request: new-session code and a name hash.
pub const SESSION_REQUEST: [u8; 2] = [14, 0x1f];

/// Build a complete login request (request code, block length, block).
pub fn login_request(
    request: u8,
    version: u16,
    server_key: u64,
    username: &str,
    password: &str,
) -> Vec<u8> {
    let mut block = PacketWriter::new(200);
    block.write_byte(255, ValueType::Standard).unwrap();
    block
        .write_short(i32::from(version), ValueType::Standard, ByteOrder::Big)
        .unwrap();
    block.write_byte(1, ValueType::Standard).unwrap();
    for crc in 0..9 {
        block
            .write_int(0x0101 * crc, ValueType::Standard, ByteOrder::Big)
            .unwrap();
    }
    block.write_byte(48, ValueType::Standard).unwrap();
    block.write_byte(10, ValueType::Standard).unwrap();
    block
        .write_long(CLIENT_KEY as i64, ValueType::Standard, ByteOrder::Big)
        .unwrap();
    block
        .write_long(server_key as i64, ValueType::Standard, ByteOrder::Big)
        .unwrap();
    block
        .write_int(314_159, ValueType::Standard, ByteOrder::Big)
        .unwrap();
    block.write_string(username).unwrap();
    block.write_string(password).unwrap();

    let mut out = vec![request, block.as_bytes().len() as u8];
    out.extend_from_slice(block.as_bytes());
    out
}

/// Server key carried by the 17-byte session reply.
pub fn server_key_from_reply(reply: &[u8]) -> u64 {
    assert_eq!(reply.len(), 17);
    assert_eq!(&reply[..9], &[0u8; 9]);
    u64::from_be_bytes(reply[9..17].try_into().unwrap())
}

/// The client's view of the cipher pair: it encrypts with the server's
/// inbound seed and decrypts with the outbound one.
pub struct ClientCiphers {
    pub encrypt: IsaacCipher,
    pub decrypt: IsaacCipher,
}

impl ClientCiphers {
    pub fn new(server_key: u64) -> Self {
        let seed = session_seed(CLIENT_KEY, server_key);
        let outbound = seed.map(|w| w.wrapping_add(OUTBOUND_SEED_OFFSET));
        Self {
            encrypt: IsaacCipher::new(&seed),
            decrypt: IsaacCipher::new(&outbound),
        }
    }

    /// Encode a client packet; `variable` adds the one-byte length field.
    pub fn packet(&mut self, opcode: u8, payload: &[u8], variable: bool) -> Vec<u8> {
        let mut out = vec![opcode.wrapping_add(self.encrypt.next_word() as u8)];
        if variable {
            out.push(payload.len() as u8);
        }
        out.extend_from_slice(payload);
        out
    }

    /// Recover the opcode of a server frame.
    pub fn opcode(&mut self, raw: u8) -> u8 {
        raw.wrapping_sub(self.decrypt.next_word() as u8)
    }
}

/// Payload framing of the server packets the tests receive.
pub enum ServerFraming {
    Fixed(usize),
    VariableShort,
}

pub fn server_framing(opcode: u8) -> ServerFraming {
    match opcode {
        53 | 81 => ServerFraming::VariableShort,
        71 => ServerFraming::Fixed(3),
        73 => ServerFraming::Fixed(4),
        109 => ServerFraming::Fixed(0),
        other => panic!("unexpected server opcode {other}"),
    }
}
