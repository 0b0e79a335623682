//! Data structures and methods for Cartesian points.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use memoffset::offset_of;
use mpi::{
    datatype::{Equivalence, UncommittedUserDatatype, UserDatatype},
    Address, Count,
};

use crate::constants::DIMENSION;
use crate::types::morton::{KeyType, MortonKey};

pub type PointType = f64;

/// A Cartesian point, described by coordinate, a unique global index, and the
/// Morton key for the deepest level octant in which it lies. The ordering of
/// points is determined by their Morton key.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Point {
    pub coordinate: [PointType; DIMENSION],
    pub global_idx: usize,
    pub key: MortonKey,
}

/// Vector of **Points**.
pub type Points = Vec<Point>;

unsafe impl Equivalence for Point {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
            &[1, 1, 1],
            &[
                offset_of!(Point, coordinate) as Address,
                offset_of!(Point, global_idx) as Address,
                offset_of!(Point, key) as Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(
                    DIMENSION as Count,
                    &PointType::equivalent_datatype(),
                )
                .as_ref(),
                UncommittedUserDatatype::contiguous(1, &usize::equivalent_datatype()).as_ref(),
                UncommittedUserDatatype::structured(
                    &[1, 1],
                    &[
                        offset_of!(MortonKey, anchor) as Address,
                        offset_of!(MortonKey, morton) as Address,
                    ],
                    &[
                        UncommittedUserDatatype::contiguous(
                            DIMENSION as Count,
                            &KeyType::equivalent_datatype(),
                        )
                        .as_ref(),
                        UncommittedUserDatatype::contiguous(1, &KeyType::equivalent_datatype())
                            .as_ref(),
                    ],
                )
                .as_ref(),
            ],
        )
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Point {}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.key.cmp(&other.key))
    }
}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
