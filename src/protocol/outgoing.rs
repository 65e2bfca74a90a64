//! # Outgoing Packets
//!
//! Encoders for the server packets a session sends. Each returns one complete
//! frame with its opcode obfuscated by the session's encrypt cipher, so frames
//! must be written to the socket in the order they were encoded.
//!
//! | Opcode | Packet            | Framing        |
//! |--------|-------------------|----------------|
//! | 53     | inventory         | variable short |
//! | 71     | sidebar interface | fixed 3        |
//! | 73     | map region        | fixed 4        |
//! | 81     | player update     | variable short |
//! | 109    | logout            | fixed 0        |

use bytes::Bytes;

use crate::core::buffer::AccessMode;
use crate::core::codec::{ByteOrder, LengthPrefix, PacketWriter, ValueType};
use crate::core::isaac::OpcodeCipher;
use crate::error::Result;
use crate::game::{ItemContainer, PlayerState, Position};

pub const OPCODE_INVENTORY: u8 = 53;
pub const OPCODE_SIDEBAR: u8 = 71;
pub const OPCODE_MAP_REGION: u8 = 73;
pub const OPCODE_PLAYER_UPDATE: u8 = 81;
pub const OPCODE_LOGOUT: u8 = 109;

/// Interface id of the backpack item grid.
pub const INVENTORY_INTERFACE: u16 = 3214;

/// Tab index and interface id of the sidebar tabs opened at login.
pub const SIDEBAR_TABS: [(u8, u16); 13] = [
    (0, 5855),
    (1, 3917),
    (2, 638),
    (3, 3213),
    (4, 1644),
    (5, 5608),
    (6, 1151),
    (8, 5065),
    (9, 5715),
    (10, 2449),
    (11, 904),
    (12, 147),
    (13, 962),
];

/// Bits in the "next update index" field that ends the local list.
const UPDATE_TERMINATOR: u32 = 2047;
const APPEARANCE_MASK: i32 = 0x10;
/// Amounts above this are sent as a full int after a 255 marker.
const MAX_BYTE_AMOUNT: u32 = 254;

pub fn map_region(cipher: &mut dyn OpcodeCipher, position: &Position) -> Result<Bytes> {
    let mut out = PacketWriter::new(5);
    out.write_header(cipher, OPCODE_MAP_REGION)?;
    out.write_short(position.region_x() + 6, ValueType::A, ByteOrder::Big)?;
    out.write_short(position.region_y() + 6, ValueType::Standard, ByteOrder::Big)?;
    Ok(out.into_bytes())
}

pub fn sidebar_interface(cipher: &mut dyn OpcodeCipher, tab: u8, interface: u16) -> Result<Bytes> {
    let mut out = PacketWriter::new(4);
    out.write_header(cipher, OPCODE_SIDEBAR)?;
    out.write_short(i32::from(interface), ValueType::Standard, ByteOrder::Big)?;
    out.write_byte(i32::from(tab), ValueType::A)?;
    Ok(out.into_bytes())
}

pub fn inventory(cipher: &mut dyn OpcodeCipher, items: &ItemContainer) -> Result<Bytes> {
    let mut out = PacketWriter::new(7 + items.capacity() * 7);
    out.write_variable_header(cipher, OPCODE_INVENTORY, LengthPrefix::Short)?;
    out.write_short(i32::from(INVENTORY_INTERFACE), ValueType::Standard, ByteOrder::Big)?;
    out.write_short(items.capacity() as i32, ValueType::Standard, ByteOrder::Big)?;
    for slot in items.slots() {
        let (id, amount) = slot.map_or((0, 0), |item| (i32::from(item.id) + 1, item.amount));
        if amount > MAX_BYTE_AMOUNT {
            out.write_byte(255, ValueType::Standard)?;
            out.write_int(amount as i32, ValueType::Standard, ByteOrder::InverseMiddle)?;
        } else {
            out.write_byte(amount as i32, ValueType::Standard)?;
        }
        out.write_short(id, ValueType::A, ByteOrder::Little)?;
    }
    out.finish_variable_header()?;
    Ok(out.into_bytes())
}

pub fn logout(cipher: &mut dyn OpcodeCipher) -> Result<Bytes> {
    let mut out = PacketWriter::new(1);
    out.write_header(cipher, OPCODE_LOGOUT)?;
    Ok(out.into_bytes())
}

/// Local player update: movement bits for this player, an empty list of
/// other players, and the appearance block when `update_required` is set.
pub fn player_update(cipher: &mut dyn OpcodeCipher, player: &PlayerState) -> Result<Bytes> {
    let mut out = PacketWriter::new(512);
    let mut block = PacketWriter::new(128);

    out.write_variable_header(cipher, OPCODE_PLAYER_UPDATE, LengthPrefix::Short)?;
    out.set_access_mode(AccessMode::Bit);

    if player.update_required {
        // Teleport to the local coordinates with an update block attached.
        out.write_bit(true)?;
        out.write_bits(2, 3)?;
        out.write_bits(2, player.position.z as u32)?;
        out.write_bit(true)?;
        out.write_bit(true)?;
        out.write_bits(7, player.position.local_y() as u32)?;
        out.write_bits(7, player.position.local_x() as u32)?;

        block.write_byte(APPEARANCE_MASK, ValueType::Standard)?;
        write_appearance(&mut block, player)?;
    } else {
        out.write_bit(false)?;
    }

    out.write_bits(8, 0)?;

    if block.position() > 0 {
        out.write_bits(11, UPDATE_TERMINATOR)?;
        out.set_access_mode(AccessMode::Byte);
        out.write_bytes(block.as_bytes())?;
    } else {
        out.set_access_mode(AccessMode::Byte);
    }

    out.finish_variable_header()?;
    Ok(out.into_bytes())
}

fn write_appearance(out: &mut PacketWriter, player: &PlayerState) -> Result<()> {
    let mut block = PacketWriter::new(64);
    block.write_byte(0, ValueType::Standard)?; // gender
    block.write_byte(0, ValueType::Standard)?; // head icon

    // Hat, cape, amulet and weapon slots are empty.
    for _ in 0..4 {
        block.write_byte(0, ValueType::Standard)?;
    }
    block.write_short(0x100 + 18, ValueType::Standard, ByteOrder::Big)?; // torso
    block.write_byte(0, ValueType::Standard)?; // shield
    for look in [26, 36, 0, 33, 42, 10] {
        // arms, legs, hair, hands, feet, beard
        block.write_short(0x100 + look, ValueType::Standard, ByteOrder::Big)?;
    }

    for colour in [7, 8, 9, 5, 0] {
        block.write_byte(colour, ValueType::Standard)?;
    }

    // stand, turn, walk, turn 180, turn 90 cw, turn 90 ccw, run
    for animation in [808, 823, 819, 820, 821, 822, 824] {
        block.write_short(animation, ValueType::Standard, ByteOrder::Big)?;
    }

    block.write_long(name_to_long(&player.username), ValueType::Standard, ByteOrder::Big)?;
    block.write_byte(3, ValueType::Standard)?; // combat level
    block.write_short(0, ValueType::Standard, ByteOrder::Big)?; // skill total

    out.write_byte(block.position() as i32, ValueType::C)?;
    out.write_bytes(block.as_bytes())
}

/// Base-37 encoding of a username, as the client stores display names.
pub fn name_to_long(name: &str) -> i64 {
    let mut value: i64 = 0;
    for c in name.chars().take(12) {
        value = value.wrapping_mul(37);
        value += match c {
            'a'..='z' => 1 + (c as i64 - 'a' as i64),
            'A'..='Z' => 1 + (c as i64 - 'A' as i64),
            '0'..='9' => 27 + (c as i64 - '0' as i64),
            _ => 0,
        };
    }
    while value != 0 && value % 37 == 0 {
        value /= 37;
    }
    value
}

/// Everything sent right after the login frame: map region, inventory and the
/// sidebar tabs.
pub fn post_login_burst(cipher: &mut dyn OpcodeCipher, player: &PlayerState) -> Result<Vec<Bytes>> {
    let mut frames = Vec::with_capacity(2 + SIDEBAR_TABS.len());
    frames.push(map_region(cipher, &player.position)?);
    frames.push(inventory(cipher, &player.inventory)?);
    for (tab, interface) in SIDEBAR_TABS {
        frames.push(sidebar_interface(cipher, tab, interface)?);
    }
    Ok(frames)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::isaac::{IsaacCipher, NullCipher};
    use crate::game::inventory::Item;
    use crate::game::position::SPAWN;

    #[test]
    fn test_map_region() {
        let frame = map_region(&mut NullCipher, &SPAWN).unwrap();
        assert_eq!(&frame[..], &[73, 0x01, 0x12, 0x01, 0x92]);
    }

    #[test]
    fn test_sidebar_and_logout() {
        let frame = sidebar_interface(&mut NullCipher, 3, 3213).unwrap();
        assert_eq!(&frame[..], &[71, 0x0C, 0x8D, 131]);
        assert_eq!(&logout(&mut NullCipher).unwrap()[..], &[109]);
    }

    #[test]
    fn test_opcode_uses_encrypt_key() {
        let mut cipher = IsaacCipher::new(&[1, 2, 3, 4]);
        let mut reference = IsaacCipher::new(&[1, 2, 3, 4]);
        let frame = logout(&mut cipher).unwrap();
        assert_eq!(frame[0], 109u8.wrapping_add(reference.next_word() as u8));
    }

    #[test]
    fn test_inventory_encoding() {
        let mut items = ItemContainer::new(3);
        items.add(Item::new(1038, 1));
        items.add(Item::new(995, 1000));

        let frame = inventory(&mut NullCipher, &items).unwrap();
        assert_eq!(
            &frame[..],
            &[
                53, 0, 17, // header, payload length
                0x0C, 0x8E, 0, 3, // interface, slot count
                1, 0x8F, 0x04, // one item 1038
                255, 0x00, 0x00, 0xE8, 0x03, 0x64, 0x03, // 1000 x item 995
                0, 0x80, 0x00, // empty slot
            ]
        );
    }

    #[test]
    fn test_idle_player_update() {
        let mut player = PlayerState::new(0, "idle");
        player.update_required = false;
        let frame = player_update(&mut NullCipher, &player).unwrap();
        assert_eq!(&frame[..], &[81, 0, 2, 0, 0]);
    }

    #[test]
    fn test_player_update_with_appearance() {
        let player = PlayerState::new(0, "zezima");
        let frame = player_update(&mut NullCipher, &player).unwrap();

        let payload_len = usize::from(u16::from_be_bytes([frame[1], frame[2]]));
        assert_eq!(payload_len, frame.len() - 3);
        assert_eq!(payload_len, 5 + 1 + 1 + 51);

        // move flag, type 3, plane 0, clear queue, update flag, first bit of y
        assert_eq!(frame[3], 0xE6);
        assert_eq!(frame[8], 0x10);
        assert_eq!(frame[9], 51u8.wrapping_neg());
    }

    #[test]
    fn test_name_to_long() {
        assert_eq!(name_to_long("a"), 1);
        assert_eq!(name_to_long("ab"), 37 + 2);
        assert_eq!(name_to_long("A b"), name_to_long("a_b"));
        assert_eq!(name_to_long(""), 0);
    }

    #[test]
    fn test_burst_order() {
        let player = PlayerState::new(0, "zezima");
        let frames = post_login_burst(&mut NullCipher, &player).unwrap();
        assert_eq!(frames.len(), 15);
        assert_eq!(frames[0][0], OPCODE_MAP_REGION);
        assert_eq!(frames[1][0], OPCODE_INVENTORY);
        assert!(frames[2..].iter().all(|f| f[0] == OPCODE_SIDEBAR));
    }
}
