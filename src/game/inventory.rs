//! Fixed-size item containers.

/// Slots in a player's backpack.
pub const INVENTORY_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub id: u16,
    pub amount: u32,
}

impl Item {
    pub const fn new(id: u16, amount: u32) -> Self {
        Self { id, amount }
    }
}

/// A container with a fixed number of slots, each empty or holding one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContainer {
    slots: Vec<Option<Item>>,
}

impl ItemContainer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Option<Item>] {
        &self.slots
    }

    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Put `item` into the first empty slot. Returns false when the container is full.
    pub fn add(&mut self, item: Item) -> bool {
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some(item);
                true
            }
            None => false,
        }
    }

    /// Empty the first slot holding `id`. Returns false when no slot holds it.
    pub fn remove_first(&mut self, id: u16) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|s| s.is_some_and(|item| item.id == id))
        {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }
}

impl Default for ItemContainer {
    fn default() -> Self {
        Self::new(INVENTORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_fills_first_empty_slot() {
        let mut c = ItemContainer::new(3);
        assert!(c.add(Item::new(1038, 1)));
        assert!(c.add(Item::new(1040, 1)));
        assert!(c.remove_first(1038));
        assert!(c.add(Item::new(995, 500)));
        assert_eq!(c.slots()[0], Some(Item::new(995, 500)));
        assert_eq!(c.free_slots(), 1);
    }

    #[test]
    fn test_full_and_missing() {
        let mut c = ItemContainer::new(1);
        assert!(c.add(Item::new(1, 1)));
        assert!(!c.add(Item::new(2, 1)));
        assert!(!c.remove_first(2));
    }
}
