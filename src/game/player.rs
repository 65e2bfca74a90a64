//! Per-session player state serialized by the outgoing encoders.

use crate::game::inventory::{Item, ItemContainer};
use crate::game::position::{Position, SPAWN};

/// Items every new character starts with (the six party hats).
const STARTER_ITEMS: [u16; 6] = [1038, 1040, 1042, 1044, 1046, 1048];

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub slot: usize,
    pub username: String,
    pub position: Position,
    pub inventory: ItemContainer,
    /// Set when the appearance block must be sent with the next update.
    pub update_required: bool,
}

impl PlayerState {
    pub fn new(slot: usize, username: impl Into<String>) -> Self {
        let mut inventory = ItemContainer::default();
        for id in STARTER_ITEMS {
            inventory.add(Item::new(id, 1));
        }
        Self {
            slot,
            username: username.into(),
            position: SPAWN,
            inventory,
            update_required: true,
        }
    }
}
