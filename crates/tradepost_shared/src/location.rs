//! World coordinates and spatial regions.
//!
//! A shop is anchored to a single block position. Regions are the host's
//! loadable/unloadable partitions of the world; shop activation follows
//! region load state.

use serde::{Deserialize, Serialize};

use crate::ids::WorldId;

/// Side length of a region in blocks.
pub const REGION_BLOCKS: i32 = 16;

/// A discrete block position in a specific world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    /// World (dimension) identifier.
    pub world: WorldId,
    /// Block X coordinate.
    pub x: i32,
    /// Block Y coordinate.
    pub y: i32,
    /// Block Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    #[inline]
    #[must_use]
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Returns the region containing this position.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionPos {
        RegionPos {
            world: self.world,
            rx: self.x.div_euclid(REGION_BLOCKS),
            rz: self.z.div_euclid(REGION_BLOCKS),
        }
    }
}

/// A loadable/unloadable spatial cell of the world.
///
/// Regions partition the horizontal plane; the Y axis is not partitioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionPos {
    /// World (dimension) identifier.
    pub world: WorldId,
    /// Region X coordinate (block X divided by [`REGION_BLOCKS`]).
    pub rx: i32,
    /// Region Z coordinate (block Z divided by [`REGION_BLOCKS`]).
    pub rz: i32,
}

impl RegionPos {
    /// Creates a new region position.
    #[inline]
    #[must_use]
    pub const fn new(world: WorldId, rx: i32, rz: i32) -> Self {
        Self { world, rx, rz }
    }
}
