//! # Game State
//!
//! The world state a session serializes: where the player stands, what they
//! carry, and whether their appearance changed. No gameplay rules live here.

pub mod inventory;
pub mod player;
pub mod position;

pub use inventory::{Item, ItemContainer};
pub use player::PlayerState;
pub use position::Position;
