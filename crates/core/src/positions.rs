//! Position types for world locations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block-aligned position (for block edits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPosition {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Center of the block in the given world
    pub fn to_location(self, world: impl Into<String>) -> Location {
        Location::new(
            world,
            self.x as f64 + 0.5,
            self.y as f64,
            self.z as f64 + 0.5,
        )
    }
}

/// Precise location in a named world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Convert to the block containing this location
    pub fn to_block(&self) -> BlockPosition {
        BlockPosition {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// Distance to another location, `None` across worlds
    pub fn distance_to(&self, other: &Location) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    /// Parse `world:x,y,z`
    pub fn parse(text: &str) -> Option<Self> {
        let (world, coords) = text.trim().split_once(':')?;
        let mut parts = coords.split(',').map(|part| part.trim().parse::<f64>());
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        let z = parts.next()?.ok()?;
        if parts.next().is_some() || world.trim().is_empty() {
            return None;
        }
        Some(Self::new(world.trim(), x, y, z))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{},{}", self.world, self.x, self.y, self.z)
    }
}
