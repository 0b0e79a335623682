//! Data structures and functions to create distributed octrees with MPI.

use std::collections::HashMap;

use mpi::{datatype::PartitionMut, topology::UserCommunicator, traits::*, Count};

use crate::{
    constants::{DEEPEST_LEVEL, DIMENSION, ROOT},
    distribute::{displacements, linearize, partition, remove_duplicates, split_into_runs},
    octree::Tree,
    sort::{merge_sorted_arrays, sample_sort},
    types::{
        domain::Domain,
        morton::{MortonKey, MortonKeys},
        point::{Point, PointType, Points},
    },
};

/// Complete a distributed, globally sorted set of octants into a linear
/// octree covering the whole root domain, algorithm 4 in [1].
///
/// The rank holding the global front extends its list down towards the first
/// deepest cell of the domain, the rank holding the global back towards the
/// last, and every rank closes its final gap against the front of its next
/// occupied successor. Ranks left empty by the balancing partition take part
/// in the collectives but contribute no octants.
pub fn complete_octree(keys: MortonKeys, world: &UserCommunicator) -> MortonKeys {
    let rank = world.rank();
    let size = world.size();

    let keys = remove_duplicates(&keys, &|a: &MortonKey, b: &MortonKey| a == b, world);
    let keys = linearize(&keys, world);
    let mut keys = partition(keys, &|_: &MortonKey| 1, world);

    // Publish which ranks hold anything, and their fronts.
    let occupied = !keys.is_empty();
    let front = keys.first().copied().unwrap_or_default();

    let mut occupieds = vec![false; size as usize];
    world.all_gather_into(&occupied, &mut occupieds[..]);
    let mut fronts = vec![MortonKey::default(); size as usize];
    world.all_gather_into(&front, &mut fronts[..]);

    // The input must span the root.
    debug_assert!(occupieds.iter().any(|&o| o));
    let first_occupied = occupieds.iter().position(|&o| o);
    let last_occupied = occupieds.iter().rposition(|&o| o);

    if occupied {
        // Sentinels at the domain boundaries. When the front already touches
        // the first deepest cell (or the back the last) there is no gap to
        // close and no sentinel is inserted.
        if Some(rank as usize) == first_occupied {
            let dfd_root = ROOT.finest_first_child();
            let front_local = keys[0];
            if front_local.finest_first_child() != dfd_root {
                let na = dfd_root.finest_ancestor(&front_local);
                let first_child = na.children().into_iter().min().unwrap();
                keys.insert(0, first_child);
            }
        }

        if Some(rank as usize) == last_occupied {
            let dld_root = ROOT.finest_last_child();
            let back_local = *keys.last().unwrap();
            if back_local.finest_last_child() != dld_root {
                let na = back_local.finest_ancestor(&dld_root);
                let last_child = na.children().into_iter().max().unwrap();
                keys.push(last_child);
            }
        } else {
            // The front of the next occupied rank bounds the last local gap.
            let next_front = occupieds
                .iter()
                .zip(fronts.iter())
                .skip(rank as usize + 1)
                .find(|&(&o, _)| o)
                .map(|(_, &f)| f)
                .unwrap();
            keys.push(next_front);
        }
    }

    // Fill the gap between every local pair.
    let mut complete = Tree { keys: Vec::new() };

    for i in 0..keys.len().saturating_sub(1) {
        let a = keys[i];
        let b = keys[i + 1];

        complete.keys.push(a);
        let mut tmp = Tree::complete_region(&a, &b);
        complete.keys.append(&mut tmp);
    }

    if Some(rank as usize) == last_occupied {
        complete.keys.push(*keys.last().unwrap());
    }

    complete.sort();
    complete.keys
}

/// Find the coarsest seed octants spanned by a set of local leaf keys [1].
fn find_seeds(leaves: &[MortonKey]) -> MortonKeys {
    let min = *leaves.iter().min().unwrap();
    let max = *leaves.iter().max().unwrap();

    // Complete the region between the least and greatest leaves.
    let mut complete = if min < max {
        Tree::complete_region(&min, &max)
    } else {
        Vec::new()
    };
    complete.push(min);
    if max != min {
        complete.push(max);
    }

    // Seeds are the octants on the coarsest level seen.
    let coarsest_level = complete.iter().map(|k| k.level()).min().unwrap();
    let mut seeds: MortonKeys = complete
        .into_iter()
        .filter(|k| k.level() == coarsest_level)
        .collect();

    seeds.sort();
    seeds
}

/// Build the coarse block octree over a distributed, globally sorted set of
/// points, and redistribute the points so that every process holds exactly
/// those covered by its local blocks.
///
/// Each rank broadcasts the bounds of its block range in turn and gathers the
/// covered points from everybody; the incoming runs are sorted and merged.
pub fn block_partition(points: &mut Points, world: &UserCommunicator) -> MortonKeys {
    let rank = world.rank();
    let size = world.size();

    let leaves: MortonKeys = points.iter().map(|p| p.key).collect();
    let seeds = if leaves.is_empty() {
        Vec::new()
    } else {
        find_seeds(&leaves)
    };

    let blocks = complete_octree(seeds, world);

    let mut runs: Vec<Points> = Vec::new();

    for p in 0..size {
        let root_process = world.process_at_rank(p);

        let mut nblocks = blocks.len() as u64;
        root_process.broadcast_into(&mut nblocks);

        if nblocks == 0 {
            continue;
        }

        // Bounds of rank p's slice of the block octree, as deepest level keys.
        let mut bounds = if rank == p {
            [
                blocks.first().unwrap().finest_first_child(),
                blocks.last().unwrap().finest_last_child(),
            ]
        } else {
            [MortonKey::default(); 2]
        };
        root_process.broadcast_into(&mut bounds[..]);

        // The covered points form a contiguous range of the sorted local
        // slice.
        let lower = points.partition_point(|point| point.key < bounds[0]);
        let upper = points.partition_point(|point| point.key <= bounds[1]);
        let msg = &points[lower..upper];
        let nsend = msg.len() as Count;

        if rank == p {
            let mut counts = vec![0 as Count; size as usize];
            root_process.gather_into_root(&nsend, &mut counts[..]);

            let displs = displacements(&counts);
            let total: Count = counts.iter().sum();
            let mut buffer = vec![Point::default(); total as usize];
            {
                let mut partition_mut =
                    PartitionMut::new(&mut buffer[..], counts.clone(), &displs[..]);
                root_process.gather_varcount_into_root(msg, &mut partition_mut);
            }
            runs = split_into_runs(&buffer, &counts);
        } else {
            root_process.gather_into(&nsend);
            root_process.gather_varcount_into(msg);
        }
    }

    *points = merge_sorted_arrays(runs);
    blocks
}

/// Split blocks until every one covers no more than `n_crit` of the local
/// points, or sits on the deepest level. Block ownership makes the counts
/// local: after [`block_partition`] every point covered by a local block is
/// itself local.
fn split_blocks(points: &Points, mut blocktree: MortonKeys, n_crit: usize) -> MortonKeys {
    loop {
        let mut new_blocktree: MortonKeys = Vec::new();
        let mut check = 0;

        for &block in blocktree.iter() {
            let npoints = covered_points(points, &block);

            if npoints > n_crit && block.level() < DEEPEST_LEVEL {
                new_blocktree.append(&mut block.children());
            } else {
                new_blocktree.push(block);
                check += 1;
            }
        }

        if check == blocktree.len() {
            return new_blocktree;
        }
        blocktree = new_blocktree;
    }
}

/// Number of local points covered by a block.
fn covered_points(points: &Points, block: &MortonKey) -> usize {
    let lower = points.partition_point(|point| point.key < block.finest_first_child());
    let upper = points.partition_point(|point| point.key <= block.finest_last_child());
    upper - lower
}

/// A distributed adaptive linear octree built over a set of point positions.
pub struct DistributedTree {
    /// Globally sorted, non-overlapping leaf octants held locally. Their
    /// union over all ranks covers the domain exactly.
    pub keys: MortonKeys,
    /// The local points, sorted by key; exactly those covered by `keys`.
    pub points: Points,
    /// Range of local point indices covered by each local leaf.
    pub leaves_to_points: HashMap<MortonKey, (usize, usize)>,
    pub domain: Domain,
}

impl DistributedTree {
    /// Create a new distributed tree from per-process point positions, with
    /// at most `n_crit` points per leaf. A leaf on the deepest level is kept
    /// even above `n_crit`, there is nothing left to split.
    pub fn new(
        points: &[[PointType; DIMENSION]],
        domain: &Domain,
        n_crit: usize,
        world: &UserCommunicator,
    ) -> DistributedTree {
        let size = world.size();

        // 1. Encode points to leaf Morton keys.
        let mut points: Points = points
            .iter()
            .enumerate()
            .map(|(i, p)| Point {
                coordinate: *p,
                global_idx: i,
                key: MortonKey::from_point(p, domain),
            })
            .collect();

        // 2. Morton sort over the encoded points.
        if size > 1 {
            sample_sort(&mut points, world);
        } else {
            points.sort();
        }

        // 3. Coarse blocks, with the points moved onto their owners.
        let blocks = block_partition(&mut points, world);

        // 4. Refine overfull blocks into the final leaves.
        let keys = split_blocks(&points, blocks, n_crit);

        let leaves_to_points = DistributedTree::assign_points_to_leaves(&points, &keys);

        DistributedTree {
            keys,
            points,
            leaves_to_points,
            domain: *domain,
        }
    }

    /// Map each leaf to the contiguous range of sorted local points it
    /// covers.
    fn assign_points_to_leaves(
        points: &Points,
        leaves: &[MortonKey],
    ) -> HashMap<MortonKey, (usize, usize)> {
        let mut map = HashMap::new();

        for &leaf in leaves.iter() {
            let lower = points.partition_point(|point| point.key < leaf.finest_first_child());
            let upper = points.partition_point(|point| point.key <= leaf.finest_last_child());
            map.insert(leaf, (lower, upper));
        }

        map
    }

    /// The local points covered by a local leaf.
    pub fn points_for(&self, leaf: &MortonKey) -> &[Point] {
        match self.leaves_to_points.get(leaf) {
            Some(&(lower, upper)) => &self.points[lower..upper],
            None => &[],
        }
    }
}
