//! Serial operations on linear octrees.

use std::ops::{Deref, DerefMut};

use crate::types::morton::{MortonKey, MortonKeys};

/// A local, sorted collection of octants.
#[derive(Debug, Default)]
pub struct Tree {
    pub keys: MortonKeys,
}

impl Tree {
    /// Remove every key that is an ancestor of its successor. Input must be
    /// sorted.
    pub fn linearize_keys(keys: &[MortonKey]) -> MortonKeys {
        let nkeys = keys.len();

        let mut new_keys = Vec::<MortonKey>::with_capacity(nkeys);

        for (i, key) in keys.iter().enumerate() {
            if i == nkeys - 1 || !key.is_ancestor(&keys[i + 1]) {
                new_keys.push(*key);
            }
        }

        new_keys
    }

    /// Construct the minimal list of non-overlapping octants covering the open
    /// region between two octants, algorithm 3 in [1]. The result never
    /// contains the bounds or an ancestor of either of them.
    pub fn complete_region(a: &MortonKey, b: &MortonKey) -> MortonKeys {
        debug_assert!(a < b);

        let mut work_list = a.finest_ancestor(b).children();

        let mut minimal_tree: MortonKeys = Vec::new();

        while let Some(current_item) = work_list.pop() {
            if (current_item > *a) & (current_item < *b) & !current_item.is_ancestor(b) {
                minimal_tree.push(current_item);
            } else if current_item.is_ancestor(a) | current_item.is_ancestor(b) {
                let mut children = current_item.children();
                work_list.append(&mut children);
            }
        }

        minimal_tree.sort();
        minimal_tree
    }

    pub fn linearize(&mut self) {
        self.keys.sort();
        self.keys = Tree::linearize_keys(&self.keys);
    }

    pub fn sort(&mut self) {
        self.keys.sort();
    }
}

impl Deref for Tree {
    type Target = MortonKeys;

    fn deref(&self) -> &Self::Target {
        &self.keys
    }
}

impl DerefMut for Tree {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use rand::prelude::*;
    use rand::SeedableRng;

    use crate::constants::{DEEPEST_LEVEL, DIMENSION, LEVEL_SIZE, ROOT};
    use crate::types::domain::Domain;
    use crate::types::morton::{encode_anchor, KeyType};

    fn tree_fixture() -> Tree {
        let npoints: u64 = 1000;

        let domain = Domain {
            origin: [0.0; DIMENSION],
            diameter: [1.0; DIMENSION],
        };

        let mut range = StdRng::seed_from_u64(0);
        let between = rand::distributions::Uniform::from(0.0..1.0);

        let mut keys: MortonKeys = Vec::new();
        for _ in 0..npoints {
            let mut point = [0.0; DIMENSION];
            for coord in point.iter_mut() {
                *coord = between.sample(&mut range);
            }
            keys.push(MortonKey::from_point(&point, &domain));
        }

        Tree { keys }
    }

    /// Volume of an octant measured in deepest level cells.
    fn volume(key: &MortonKey) -> u64 {
        1u64 << (DIMENSION as u32 * (DEEPEST_LEVEL - key.level()) as u32)
    }

    #[test]
    fn test_linearize() {
        let mut tree = tree_fixture();
        tree.linearize();

        // Test that a linearized tree is sorted
        for window in tree.windows(2) {
            assert!(window[0] <= window[1]);
        }

        // Test that elements in a linearized tree are unique
        let unique: HashSet<MortonKey> = tree.iter().cloned().collect();
        assert!(unique.len() == tree.len());

        // Test that a linearized tree contains no overlaps
        for window in tree.windows(2) {
            assert!(!window[0].is_ancestor(&window[1]));
        }

        // Linearizing again changes nothing
        let linearized = Tree::linearize_keys(&tree.keys);
        assert_eq!(linearized, tree.keys);
    }

    #[test]
    fn test_complete_region() {
        let domain = Domain {
            origin: [0.0; DIMENSION],
            diameter: [1.0; DIMENSION],
        };

        let a = MortonKey::from_point(&[0.1; DIMENSION], &domain);
        let b = MortonKey::from_point(&[0.9; DIMENSION], &domain);

        let region = Tree::complete_region(&a, &b);

        let fa = a.finest_ancestor(&b);

        let min = region.iter().min().unwrap();
        let max = region.iter().max().unwrap();

        // Test that bounds are satisfied
        assert!(a < *min);
        assert!(b > *max);

        // Test that the FCA is an ancestor of all nodes in the result
        for node in region.iter() {
            assert!(fa.is_ancestor(node));
        }

        // Test that completed region doesn't contain its bounds, or any of
        // their ancestors
        assert!(!region.contains(&a));
        assert!(!region.contains(&b));
        for node in region.iter() {
            assert!(!node.is_ancestor(&a));
            assert!(!node.is_ancestor(&b));
        }

        // Test that the completed region doesn't contain any overlaps
        for node in region.iter() {
            for other in region.iter().filter(|&other| other != node) {
                assert!(!node.is_ancestor(other));
            }
        }

        // Test that the region is sorted
        for window in region.windows(2) {
            assert!(window[0] <= window[1]);
        }
    }

    /// Corner to corner at level 2: the gap is covered by the interior level 1
    /// octants plus the remaining siblings of the bounds at level 2, and
    /// nothing else.
    #[test]
    fn test_complete_region_minimal() {
        let step = LEVEL_SIZE / 4;

        let anchor_a = [0; DIMENSION];
        let a = MortonKey {
            anchor: anchor_a,
            morton: encode_anchor(&anchor_a, 2),
        };

        let anchor_b: [KeyType; DIMENSION] = [3 * step; DIMENSION];
        let b = MortonKey {
            anchor: anchor_b,
            morton: encode_anchor(&anchor_b, 2),
        };

        let region = Tree::complete_region(&a, &b);

        let interior = region.iter().filter(|k| k.level() == 1).count();
        let boundary = region.iter().filter(|k| k.level() == 2).count();

        assert_eq!(interior, (1 << DIMENSION) - 2);
        assert_eq!(boundary, 2 * ((1 << DIMENSION) - 1));
        assert_eq!(region.len(), interior + boundary);

        // The union of the region and the two bounds tiles the root exactly.
        let covered: u64 = region.iter().map(volume).sum();
        let total = 1u64 << (DIMENSION as u32 * DEEPEST_LEVEL as u32);
        assert_eq!(covered, total - volume(&a) - volume(&b));
    }

    /// The region between an octant and its deepest last descendent tiles the
    /// whole subtree below the octant, short of that one cell.
    #[test]
    fn test_complete_region_within_subtree() {
        let a = ROOT.children()[0];
        let b = a.finest_last_child();

        let region = Tree::complete_region(&a, &b);

        for node in region.iter() {
            assert!(a.is_ancestor(node));
            assert!(!node.is_ancestor(&b));
        }

        let covered: u64 = region.iter().map(volume).sum();
        assert_eq!(covered, volume(&a) - volume(&b));

        // Between an octant and its first child the curve has no room at all.
        let first_child = a.children()[0];
        assert!(Tree::complete_region(&a, &first_child).is_empty());
    }
}
