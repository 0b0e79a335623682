//! Routines for Morton encoding and decoding.

use itertools::izip;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use memoffset::offset_of;
use mpi::{
    datatype::{Equivalence, UncommittedUserDatatype, UserDatatype},
    Address, Count,
};

use crate::constants::{
    DEEPEST_LEVEL, DIMENSION, LEVEL_DISPLACEMENT, LEVEL_MASK, LEVEL_SIZE, NSIBLINGS,
};
use crate::types::domain::Domain;
use crate::types::point::PointType;

pub type KeyType = u64;

/// Representation of a Morton key.
///
/// The Morton form interleaves the `DEEPEST_LEVEL` low bits of each anchor
/// coordinate above a five bit level field: bit `LEVEL_DISPLACEMENT + i * DIMENSION + d`
/// of the key is bit `i` of `anchor[d]`. Keys therefore order along the space
/// filling curve, and for a shared anchor the coarser octant orders first.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MortonKey {
    pub anchor: [KeyType; DIMENSION],
    pub morton: KeyType,
}

/// Vector of **MortonKeys**.
pub type MortonKeys = Vec<MortonKey>;

unsafe impl Equivalence for MortonKey {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
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
                UncommittedUserDatatype::contiguous(1, &KeyType::equivalent_datatype()).as_ref(),
            ],
        )
    }
}

impl Default for MortonKey {
    fn default() -> Self {
        MortonKey {
            anchor: [0; DIMENSION],
            morton: 0,
        }
    }
}

impl MortonKey {
    /// Return the anchor
    pub fn anchor(&self) -> &[KeyType; DIMENSION] {
        &self.anchor
    }

    /// Return the Morton representation
    pub fn morton(&self) -> KeyType {
        self.morton
    }

    /// Return the level
    pub fn level(&self) -> KeyType {
        find_level(self.morton)
    }

    /// Return a `MortonKey` type from a Morton index
    pub fn from_morton(morton: KeyType) -> Self {
        let anchor = decode_key(morton);

        MortonKey { anchor, morton }
    }

    /// Return a `MortonKey` type from the anchor on the deepest level
    pub fn from_anchor(anchor: &[KeyType; DIMENSION]) -> Self {
        let morton = encode_anchor(anchor, DEEPEST_LEVEL);

        MortonKey {
            anchor: anchor.to_owned(),
            morton,
        }
    }

    /// Return a `MortonKey` associated with the box that encloses the point on the deepest level
    pub fn from_point(point: &[PointType; DIMENSION], domain: &Domain) -> Self {
        let anchor = point_to_anchor(point, DEEPEST_LEVEL, &domain.origin, &domain.diameter);
        MortonKey::from_anchor(&anchor)
    }

    /// Return the parent. The root is its own orphan, calling this on it is a
    /// programmer error.
    pub fn parent(&self) -> Self {
        let level = self.level();
        debug_assert!(level > 0);

        let morton = self.morton >> LEVEL_DISPLACEMENT;

        let parent_level = level - 1;
        // Zeros out the anchor bits below the parent level.
        let bit_multiplier = DIMENSION * (DEEPEST_LEVEL - parent_level) as usize;
        let parent_morton_without_level = (morton >> bit_multiplier) << bit_multiplier;

        let parent_morton = (parent_morton_without_level << LEVEL_DISPLACEMENT) | parent_level;

        MortonKey::from_morton(parent_morton)
    }

    /// Return the first child on the deepest level
    pub fn finest_first_child(&self) -> Self {
        MortonKey {
            anchor: self.anchor,
            morton: DEEPEST_LEVEL - self.level() + self.morton,
        }
    }

    /// Return the last child on the deepest level
    pub fn finest_last_child(&self) -> Self {
        let mut anchor = self.anchor;
        let step = (1 << (DEEPEST_LEVEL - self.level())) - 1;
        for coord in anchor.iter_mut() {
            *coord += step;
        }

        MortonKey {
            anchor,
            morton: encode_anchor(&anchor, DEEPEST_LEVEL),
        }
    }

    /// Return all children in order of their Morton indices. Only valid above
    /// the deepest level.
    pub fn children(&self) -> MortonKeys {
        let level = self.level();
        debug_assert!(level < DEEPEST_LEVEL);

        let step = 1 << (DEEPEST_LEVEL - level - 1);
        let mut children: MortonKeys = Vec::with_capacity(NSIBLINGS);

        for index in 0..NSIBLINGS {
            let mut anchor = self.anchor;
            for (dim, coord) in anchor.iter_mut().enumerate() {
                if (index >> dim) & 1 == 1 {
                    *coord += step;
                }
            }
            let morton = encode_anchor(&anchor, level + 1);
            children.push(MortonKey { anchor, morton });
        }

        children
    }

    /// Return the other children of the parent of the current Morton index.
    /// Empty for the root.
    pub fn siblings(&self) -> MortonKeys {
        if self.level() == 0 {
            return Vec::new();
        }

        self.parent()
            .children()
            .into_iter()
            .filter(|child| child != self)
            .collect()
    }

    /// Check if the key is an ancestor of `other`, in the strict sense.
    pub fn is_ancestor(&self, other: &MortonKey) -> bool {
        if self.level() >= other.level() {
            return false;
        }

        let shift = DEEPEST_LEVEL - self.level();
        izip!(&self.anchor, &other.anchor).all(|(a, b)| a >> shift == b >> shift)
    }

    /// Check if key is a descendent of another key, in the strict sense.
    pub fn is_descendent(&self, other: &MortonKey) -> bool {
        other.is_ancestor(self)
    }

    /// Return set of all ancestors
    pub fn ancestors(&self) -> HashSet<MortonKey> {
        let mut ancestors = HashSet::<MortonKey>::new();

        let mut current = *self;

        while current.level() > 0 {
            current = current.parent();
            ancestors.insert(current);
        }

        ancestors
    }

    /// Return the physical coordinates of the anchor.
    pub fn to_coordinates(&self, domain: &Domain) -> [PointType; DIMENSION] {
        let mut coord: [PointType; DIMENSION] = [0.0; DIMENSION];

        for (anchor_value, coord_ref, origin_value, diameter_value) in
            izip!(&self.anchor, &mut coord, &domain.origin, &domain.diameter)
        {
            *coord_ref = origin_value
                + diameter_value * (*anchor_value as PointType) / (LEVEL_SIZE as PointType);
        }

        coord
    }

    /// Find the finest common ancestor of this key and another key.
    ///
    /// The number of shared leading anchor bits across every coordinate bounds
    /// the level of the common ancestor, so no walk up the tree is needed.
    pub fn finest_ancestor(&self, other: &MortonKey) -> MortonKey {
        if self == other {
            return *other;
        }

        let mut shared = DEEPEST_LEVEL;
        for (a, b) in izip!(&self.anchor, &other.anchor) {
            let diff = a ^ b;
            if diff != 0 {
                // Anchors agree on DEEPEST_LEVEL - 1 - floor(log2(diff)) leading bits.
                shared = shared.min(DEEPEST_LEVEL + diff.leading_zeros() as KeyType - 64);
            }
        }
        let level = shared.min(self.level()).min(other.level());

        let shift = DEEPEST_LEVEL - level;
        let mut anchor = [0; DIMENSION];
        for (coord, a) in izip!(&mut anchor, &self.anchor) {
            *coord = (a >> shift) << shift;
        }

        MortonKey {
            anchor,
            morton: encode_anchor(&anchor, level),
        }
    }
}

impl PartialEq for MortonKey {
    fn eq(&self, other: &Self) -> bool {
        self.morton == other.morton
    }
}

impl Eq for MortonKey {}

impl Ord for MortonKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.morton.cmp(&other.morton)
    }
}

impl PartialOrd for MortonKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for MortonKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.morton.hash(state);
    }
}

/// Return the level associated with a key.
fn find_level(morton: KeyType) -> KeyType {
    morton & LEVEL_MASK
}

/// Encode an anchor.
///
/// Returns the Morton key associated with the given anchor at the given level.
pub fn encode_anchor(anchor: &[KeyType; DIMENSION], level: KeyType) -> KeyType {
    let mut key = level & LEVEL_MASK;

    let mut bit = LEVEL_DISPLACEMENT;
    for anchor_bit in 0..DEEPEST_LEVEL {
        for coord in anchor.iter() {
            key |= ((coord >> anchor_bit) & 1) << bit;
            bit += 1;
        }
    }

    key
}

/// Decode a given key.
///
/// Returns the anchor for the given Morton key.
pub fn decode_key(morton: KeyType) -> [KeyType; DIMENSION] {
    let key = morton >> LEVEL_DISPLACEMENT;

    let mut anchor = [0; DIMENSION];
    for anchor_bit in 0..DEEPEST_LEVEL as usize {
        for (dim, coord) in anchor.iter_mut().enumerate() {
            *coord |= ((key >> (anchor_bit * DIMENSION + dim)) & 1) << anchor_bit;
        }
    }

    anchor
}

/// Map a point to the anchor of the enclosing box.
///
/// Returns the integer coordinates of the enclosing box.
///
/// # Arguments
/// `point` - The coordinates of the point to map.
/// `level` - The level of the tree at which the point will be mapped.
/// `origin` - The origin of the bounding box.
/// `diameter` - The diameter of the bounding box in each dimension.
fn point_to_anchor(
    point: &[PointType; DIMENSION],
    level: KeyType,
    origin: &[PointType; DIMENSION],
    diameter: &[PointType; DIMENSION],
) -> [KeyType; DIMENSION] {
    let mut anchor: [KeyType; DIMENSION] = [0; DIMENSION];

    let level_size = (1u64 << level) as PointType;

    for (anchor_value, point_value, &origin_value, &diameter_value) in
        izip!(&mut anchor, point, origin, diameter)
    {
        *anchor_value =
            ((point_value - origin_value) * level_size / diameter_value).floor() as KeyType
    }

    anchor
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::constants::ROOT;

    /// Test encoding and decoding an anchor
    #[test]
    fn test_encoding_decoding() {
        let anchor: [KeyType; DIMENSION] = [LEVEL_SIZE - 1; DIMENSION];

        let actual = decode_key(encode_anchor(&anchor, DEEPEST_LEVEL));

        assert_eq!(anchor, actual);
    }

    /// Coarser keys with the same anchor must order first.
    #[test]
    fn test_ordering_same_anchor() {
        let anchor: [KeyType; DIMENSION] = [0; DIMENSION];

        let coarse = MortonKey {
            anchor,
            morton: encode_anchor(&anchor, 1),
        };
        let fine = MortonKey::from_anchor(&anchor);

        assert!(ROOT < coarse);
        assert!(coarse < fine);
    }

    #[test]
    fn test_parent_child_relationship() {
        let children = ROOT.children();

        assert_eq!(children.len(), NSIBLINGS);

        // Children arrive in ascending Morton order, and all name the same parent.
        for window in children.windows(2) {
            assert!(window[0] < window[1]);
        }
        for child in children.iter() {
            assert_eq!(child.parent(), ROOT);
            assert_eq!(child.level(), 1);
            assert!(ROOT.is_ancestor(child));
            assert!(child.is_descendent(&ROOT));
        }
    }

    #[test]
    fn test_siblings() {
        let child = ROOT.children()[0];
        let siblings = child.siblings();

        assert_eq!(siblings.len(), NSIBLINGS - 1);
        assert!(!siblings.contains(&child));
        assert!(ROOT.siblings().is_empty());
    }

    #[test]
    fn test_ancestry_is_strict() {
        let key = MortonKey::from_anchor(&[1; DIMENSION]);

        assert!(!key.is_ancestor(&key));
        assert!(ROOT.is_ancestor(&key));
        assert!(key.ancestors().contains(&ROOT));
        assert_eq!(key.ancestors().len(), DEEPEST_LEVEL as usize);
    }

    #[test]
    fn test_finest_descendents() {
        let child = ROOT.children()[1];

        let dfd = child.finest_first_child();
        let dld = child.finest_last_child();

        assert_eq!(dfd.level(), DEEPEST_LEVEL);
        assert_eq!(dld.level(), DEEPEST_LEVEL);
        assert_eq!(dfd.anchor, child.anchor);
        assert!(child.is_ancestor(&dfd));
        assert!(child.is_ancestor(&dld));

        let step = LEVEL_SIZE / 2 - 1;
        for dim in 0..DIMENSION {
            assert_eq!(dld.anchor[dim], child.anchor[dim] + step);
        }

        assert_eq!(ROOT.finest_first_child().anchor, [0; DIMENSION]);
        assert_eq!(
            ROOT.finest_last_child().anchor,
            [LEVEL_SIZE - 1; DIMENSION]
        );
    }

    #[test]
    fn test_finest_ancestor() {
        let child = ROOT.children()[0];

        // Extremes of a subtree meet at its root.
        let dfd = child.finest_first_child();
        let dld = child.finest_last_child();
        assert_eq!(dfd.finest_ancestor(&dld), child);

        // Keys from different halves of the domain only share the root.
        let last = ROOT.children()[NSIBLINGS - 1];
        assert_eq!(dfd.finest_ancestor(&last.finest_last_child()), ROOT);

        // An ancestor is its own finest common ancestor with any descendent.
        assert_eq!(child.finest_ancestor(&dld), child);
        assert_eq!(child.finest_ancestor(&child), child);
    }

    #[test]
    fn test_to_coordinates_round_trip() {
        let domain = Domain {
            origin: [0.5; DIMENSION],
            diameter: [2.0; DIMENSION],
        };

        let point = [1.25; DIMENSION];
        let key = MortonKey::from_point(&point, &domain);
        let coords = key.to_coordinates(&domain);

        // The anchor corner lies at most one deepest level cell below the point.
        let cell = 2.0 / LEVEL_SIZE as PointType;
        for dim in 0..DIMENSION {
            assert!(coords[dim] <= point[dim]);
            assert!(point[dim] < coords[dim] + cell);
        }
    }

    #[test]
    fn test_from_point() {
        let domain = Domain {
            origin: [0.0; DIMENSION],
            diameter: [1.0; DIMENSION],
        };

        let point = [0.5; DIMENSION];
        let key = MortonKey::from_point(&point, &domain);

        assert_eq!(key.level(), DEEPEST_LEVEL);
        assert_eq!(key.anchor, [LEVEL_SIZE / 2; DIMENSION]);

        // The enclosing box contains its point.
        let cell = 1.0 / LEVEL_SIZE as PointType;
        for dim in 0..DIMENSION {
            let lower = key.anchor[dim] as PointType * cell;
            assert!(lower <= point[dim] && point[dim] < lower + cell);
        }
    }
}
