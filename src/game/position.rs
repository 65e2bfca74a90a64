//! World coordinates and the region-relative coordinates the client renders with.

/// Absolute tile position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Region chunk whose origin is six chunks south-west of the player's chunk.
    pub fn region_x(&self) -> i32 {
        (self.x >> 3) - 6
    }

    pub fn region_y(&self) -> i32 {
        (self.y >> 3) - 6
    }

    /// X relative to the loaded region's origin.
    pub fn local_x(&self) -> i32 {
        self.x - 8 * self.region_x()
    }

    pub fn local_y(&self) -> i32 {
        self.y - 8 * self.region_y()
    }
}

/// Where new players appear.
pub const SPAWN: Position = Position::new(3222, 3218, 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_math() {
        let p = SPAWN;
        assert_eq!(p.region_x(), 396);
        assert_eq!(p.region_y(), 396);
        assert_eq!(p.local_x(), 54);
        assert_eq!(p.local_y(), 50);
    }

    #[test]
    fn test_local_coordinates_fit_seven_bits() {
        for x in 3200..3264 {
            let p = Position::new(x, x, 0);
            assert!((48..56).contains(&p.local_x()));
            assert!(p.local_y() < 128);
        }
    }
}
