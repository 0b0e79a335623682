//! Crate wide constants.
use const_env::from_env;

use crate::types::morton::{KeyType, MortonKey};

/// Spatial dimension of the simulation. Boids live in 2 or 3 dimensions.
#[from_env("SWARM_DIMENSION")]
pub const DIMENSION: usize = 3;

/// The deepest admissible level of the octree.
#[from_env("SWARM_DEEPEST_LEVEL")]
pub const DEEPEST_LEVEL: KeyType = 16;

/// Default maximum number of points per leaf octant.
#[from_env("SWARM_NCRIT")]
pub const NCRIT: usize = 150;

/// Number of boxes along each axis at the deepest level.
pub const LEVEL_SIZE: KeyType = 1 << DEEPEST_LEVEL;

/// Number of children of a non-leaf octant.
pub const NSIBLINGS: usize = 1 << DIMENSION;

/// Number of bits used for level information in a Morton key.
pub const LEVEL_DISPLACEMENT: usize = 5;

/// Mask for the level field of a Morton key.
pub const LEVEL_MASK: KeyType = 0x1F;

pub const ROOT: MortonKey = MortonKey {
    anchor: [0; DIMENSION],
    morton: 0,
};

// A key interleaves DIMENSION * DEEPEST_LEVEL anchor bits above the level field.
const _: () = assert!(DIMENSION * DEEPEST_LEVEL as usize + LEVEL_DISPLACEMENT <= 64);
