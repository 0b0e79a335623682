//! Correctness scenarios for the distributed collectives, run under mpirun,
//! e.g. `mpirun -n 4 parallel-tests`. Each scenario asserts on every rank.

use mpi::collective::SystemOperation;
use mpi::topology::{Color, UserCommunicator};
use mpi::traits::*;

use swarm_tree::constants::{DEEPEST_LEVEL, DIMENSION, LEVEL_SIZE, ROOT};
use swarm_tree::data::random_points;
use swarm_tree::distribute::{
    distributed_scan, is_sorted_distributed, linearize, partition, remove_duplicates,
    sorted_count_distributed, sorted_range_count_distributed, sorted_range_count_from_root,
    sorted_search_distributed,
};
use swarm_tree::distributed::{block_partition, complete_octree, DistributedTree};
use swarm_tree::sort::sample_sort;
use swarm_tree::types::domain::Domain;
use swarm_tree::types::morton::{encode_anchor, KeyType, MortonKey, MortonKeys};
use swarm_tree::types::point::{Point, Points};

fn report(name: &str, world: &UserCommunicator) {
    world.barrier();
    if world.rank() == 0 {
        println!("{} ... ok", name);
    }
}

/// Volume of an octant measured in deepest level cells.
fn volume(key: &MortonKey) -> u64 {
    1u64 << (DIMENSION as u32 * (DEEPEST_LEVEL - key.level()) as u32)
}

/// All octants on level 5, in Morton order.
fn level5_keys() -> MortonKeys {
    let level: usize = 5;
    let boxes_per_axis = 1u64 << level;
    let step = LEVEL_SIZE >> level;
    let total = 1usize << (DIMENSION * level);

    let mut keys = Vec::with_capacity(total);
    for index in 0..total as u64 {
        let mut anchor = [0 as KeyType; DIMENSION];
        for (dim, coord) in anchor.iter_mut().enumerate() {
            *coord = ((index >> (level * dim)) & (boxes_per_axis - 1)) * step;
        }
        let morton = encode_anchor(&anchor, level as KeyType);
        keys.push(MortonKey { anchor, morton });
    }

    keys.sort();
    keys
}

/// The distributed scan offsets every local prefix by the totals of the
/// preceding ranks, including over empty slices.
fn test_distributed_scan(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    // Leave one interior rank empty.
    let empty_rank = 1;
    let local: Vec<u64> = if rank == empty_rank && size > 2 {
        Vec::new()
    } else {
        (1..=10).collect()
    };

    let scan = distributed_scan(&local, &|&x| x, world);

    let nfull_before = (0..rank).filter(|&r| !(r == empty_rank && size > 2)).count() as u64;
    let offset = nfull_before * 55;

    assert_eq!(scan.len(), local.len());
    let mut acc = offset;
    for (value, result) in local.iter().zip(scan.iter()) {
        acc += value;
        assert_eq!(*result, acc);
    }

    report("distributed scan", world);
}

/// Sample sort on contiguous chunks handed out in reverse rank order puts
/// every chunk back where it belongs, exactly.
fn test_sample_sort_contiguous(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();
    if size < 2 {
        return;
    }

    let keys = level5_keys();
    let total = keys.len();
    if total % size as usize != 0 {
        return;
    }
    let chunk = total / size as usize;

    let offset = (size - 1 - rank) as usize * chunk;
    let mut local: MortonKeys = keys[offset..offset + chunk].to_vec();

    sample_sort(&mut local, world);

    let expected = &keys[rank as usize * chunk..(rank as usize + 1) * chunk];
    assert_eq!(local.len(), chunk);
    assert_eq!(&local[..], expected);
    assert!(is_sorted_distributed(&local, world));

    report("sample sort, contiguous chunks", world);
}

/// Sample sort yields a globally sorted permutation of arbitrary input.
fn test_sample_sort_random(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();
    if size < 2 {
        return;
    }

    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };
    let mut local: MortonKeys = random_points(1000 + 123 * rank as usize, rank as u64)
        .iter()
        .map(|p| MortonKey::from_point(p, &domain))
        .collect();

    let checksum_before: u64 = local.iter().map(|k| k.morton).fold(0, u64::wrapping_add);
    let count_before = local.len() as u64;

    sample_sort(&mut local, world);

    let checksum_after: u64 = local.iter().map(|k| k.morton).fold(0, u64::wrapping_add);
    let count_after = local.len() as u64;

    let mut totals_before = [0u64; 2];
    let mut totals_after = [0u64; 2];
    world.all_reduce_into(
        &[checksum_before, count_before][..],
        &mut totals_before[..],
        SystemOperation::sum(),
    );
    world.all_reduce_into(
        &[checksum_after, count_after][..],
        &mut totals_after[..],
        SystemOperation::sum(),
    );

    assert_eq!(totals_before[1], totals_after[1]);
    assert_eq!(totals_before[0], totals_after[0]);
    assert!(is_sorted_distributed(&local, world));

    report("sample sort, random input", world);
}

/// Partition with unit weights evens out a skewed distribution of 1000
/// elements to 1000 / P each, give or take the integer slack.
fn test_partition_balances(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();
    if size > 20 {
        return;
    }

    // Rank 0 starts out hoarding almost everything.
    let total: u64 = 1000;
    let tail = 50u64;
    let split = total - tail * (size as u64 - 1);
    let local: Vec<u64> = if rank == 0 {
        (0..split).collect()
    } else {
        let start = split + (rank as u64 - 1) * tail;
        (start..start + tail).collect()
    };

    let balanced = partition(local, &|_| 1, world);

    let w = total / size as u64;
    let k = total % size as u64;
    let share = w + if (rank as u64) < k { 1 } else { 0 };
    let start = rank as u64 * w + (rank as u64).min(k);

    let expected: Vec<u64> = (start..start + share).collect();
    assert_eq!(balanced, expected);
    assert!(is_sorted_distributed(&balanced, world));

    report("partition", world);
}

/// Duplicate runs collapse to their first occurrence, also across the rank
/// boundary.
fn test_remove_duplicates(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    let eq = |a: &u64, b: &u64| a == b;

    // Every rank ends on the first element of its successor.
    let base = 3 * rank as u64;
    let local: Vec<u64> = vec![base, base + 1, base + 1, base + 2, base + 3];

    let deduplicated = remove_duplicates(&local, &eq, world);

    let expected: Vec<u64> = if rank == 0 {
        vec![0, 1, 2, 3]
    } else {
        vec![base + 1, base + 2, base + 3]
    };
    assert_eq!(deduplicated, expected);

    if size == 2 {
        let local: Vec<u64> = if rank == 0 {
            vec![1, 2, 3, 4, 4]
        } else {
            vec![4, 4, 5, 6, 6, 7]
        };

        let deduplicated = remove_duplicates(&local, &eq, world);

        let expected: Vec<u64> = if rank == 0 {
            vec![1, 2, 3, 4]
        } else {
            vec![5, 6, 7]
        };
        assert_eq!(deduplicated, expected);
    }

    report("remove duplicates", world);
}

/// Linearizing a distributed chain of nested octants leaves only the deepest.
fn test_linearize(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();
    if 2 * size as u64 > DEEPEST_LEVEL {
        return;
    }

    // Rank r holds the levels 2r + 1 and 2r + 2 of one descent along the
    // first-child line; every adjacent pair overlaps, across ranks included.
    let key_at = |level: u64| MortonKey {
        anchor: [0; DIMENSION],
        morton: encode_anchor(&[0; DIMENSION], level),
    };
    let local = vec![key_at(2 * rank as u64 + 1), key_at(2 * rank as u64 + 2)];

    let linearized = linearize(&local, world);

    if rank == size - 1 {
        assert_eq!(linearized, vec![key_at(2 * size as u64)]);
    } else {
        assert!(linearized.is_empty());
    }

    report("linearize", world);
}

/// Sorted range counts, including the scenario with a long constant tail.
fn test_sorted_range_count(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    let local: Vec<u64> = (10 * rank as u64..10 * rank as u64 + 10).collect();

    let count = sorted_range_count_distributed(&local, &5, &(10 * size as u64 - 5), world);
    assert_eq!(count, 10 * size as u64 - 9);

    // Bounds known on the last rank only.
    let (lhs, rhs) = if rank == size - 1 {
        (5, 10 * size as u64 - 5)
    } else {
        (0, 0)
    };
    let count = sorted_range_count_from_root(&local, &lhs, &rhs, size - 1, world);
    assert_eq!(count, 10 * size as u64 - 9);

    assert!(sorted_search_distributed(&local, &7, world));
    assert!(!sorted_search_distributed(&local, &(10 * size as u64), world));
    assert_eq!(sorted_count_distributed(&local, &7, world), 1);

    if size == 2 {
        let local: Vec<u64> = if rank == 0 {
            vec![1, 2, 3, 4, 4]
        } else {
            vec![5, 5, 5, 6, 6, 7, 9, 10, 11, 11, 11, 11, 11, 11, 11, 11, 11, 11, 11]
        };

        assert_eq!(sorted_range_count_distributed(&local, &5, &11, world), 19);
        assert_eq!(sorted_range_count_distributed(&local, &3, &4, world), 3);
    }

    report("sorted range count", world);
}

/// Completing sparse seed leaves produces a linear octree tiling the whole
/// domain.
fn test_complete_octree(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    // One deepest level seed per rank, spread across the domain.
    let position = [(rank as f64 + 0.5) / size as f64; DIMENSION];
    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };
    let local = vec![MortonKey::from_point(&position, &domain)];

    let complete = complete_octree(local, world);

    assert!(is_sorted_distributed(&complete, world));

    // No rank-local or cross-rank overlaps survive.
    let relinearized = linearize(&complete, world);
    assert_eq!(relinearized, complete);

    // The union of all local volumes tiles the root exactly.
    let local_volume: u64 = complete.iter().map(volume).sum();
    let mut total_volume = 0u64;
    world.all_reduce_into(&local_volume, &mut total_volume, SystemOperation::sum());
    assert_eq!(total_volume, volume(&ROOT));

    if rank == 0 {
        let front = complete.first().unwrap();
        assert_eq!(front.finest_first_child(), ROOT.finest_first_child());
    }
    if rank == size - 1 {
        let back = complete.last().unwrap();
        assert_eq!(back.finest_last_child(), ROOT.finest_last_child());
    }

    if size == 3 {
        // Three corner-to-corner seeds: the domain boundary octants are the
        // seeds themselves, and the gaps between them are dominated by
        // coarse octants directly below the root.
        let corner = |anchor: [KeyType; DIMENSION]| MortonKey {
            anchor,
            morton: encode_anchor(&anchor, DEEPEST_LEVEL),
        };
        let local = match rank {
            0 => vec![corner([0; DIMENSION])],
            1 => vec![corner([LEVEL_SIZE / 2; DIMENSION])],
            _ => vec![corner([LEVEL_SIZE - 1; DIMENSION])],
        };

        let complete = complete_octree(local, world);

        let local_volume: u64 = complete.iter().map(volume).sum();
        let mut total_volume = 0u64;
        world.all_reduce_into(&local_volume, &mut total_volume, SystemOperation::sum());
        assert_eq!(total_volume, volume(&ROOT));

        let local_min_level = complete.iter().map(|k| k.level()).min().unwrap();
        let mut global_min_level = 0 as KeyType;
        world.all_reduce_into(&local_min_level, &mut global_min_level, SystemOperation::min());
        assert_eq!(global_min_level, 1);
    }

    report("complete octree", world);
}

/// Block partition hands every rank a contiguous run of coarse blocks and
/// exactly the points those blocks cover.
fn test_block_partition(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };
    let mut points: Points = random_points(1000, 1000 + rank as u64)
        .iter()
        .enumerate()
        .map(|(i, p)| Point {
            coordinate: *p,
            global_idx: i,
            key: MortonKey::from_point(p, &domain),
        })
        .collect();

    if size > 1 {
        sample_sort(&mut points, world);
    } else {
        points.sort();
    }

    let blocks = block_partition(&mut points, world);

    // The blocks form a complete linear octree.
    assert!(is_sorted_distributed(&blocks, world));
    let local_volume: u64 = blocks.iter().map(volume).sum();
    let mut total_volume = 0u64;
    world.all_reduce_into(&local_volume, &mut total_volume, SystemOperation::sum());
    assert_eq!(total_volume, volume(&ROOT));

    // Every local point falls inside the local block range, and the
    // redistribution lost nothing.
    if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
        for point in points.iter() {
            assert!(first.finest_first_child() <= point.key);
            assert!(point.key <= last.finest_last_child());
        }
    } else {
        assert!(points.is_empty());
    }

    let local_count = points.len() as u64;
    let mut global_count = 0u64;
    world.all_reduce_into(&local_count, &mut global_count, SystemOperation::sum());
    assert_eq!(global_count, 1000 * size as u64);

    report("block partition", world);
}

/// The full pipeline: every leaf respects the occupancy bound, the leaves
/// tile the domain, and no point is lost or left uncovered.
fn test_points2octree(world: &UserCommunicator) {
    let rank = world.rank();
    let size = world.size();

    let npoints = 2000;
    let n_crit = 64;
    let points = random_points(npoints, rank as u64);
    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };

    let tree = DistributedTree::new(&points, &domain, n_crit, world);

    // Leaves are sorted and overlap free, globally.
    assert!(is_sorted_distributed(&tree.keys, world));
    let relinearized = linearize(&tree.keys, world);
    assert_eq!(relinearized, tree.keys);

    // Leaves tile the domain.
    let local_volume: u64 = tree.keys.iter().map(volume).sum();
    let mut total_volume = 0u64;
    world.all_reduce_into(&local_volume, &mut total_volume, SystemOperation::sum());
    assert_eq!(total_volume, volume(&ROOT));

    // The occupancy bound holds wherever a split was still possible, and
    // every local point is covered by exactly one local leaf.
    let mut covered = 0;
    for leaf in tree.keys.iter() {
        let points_in_leaf = tree.points_for(leaf).len();
        assert!(points_in_leaf <= n_crit || leaf.level() == DEEPEST_LEVEL);
        covered += points_in_leaf;
    }
    assert_eq!(covered, tree.points.len());

    // No point went missing in the shuffles.
    let local_count = tree.points.len() as u64;
    let mut global_count = 0u64;
    world.all_reduce_into(&local_count, &mut global_count, SystemOperation::sum());
    assert_eq!(global_count, npoints as u64 * size as u64);

    report("points to octree", world);
}

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let world = world.split_by_color(Color::with_value(0)).unwrap();

    if world.rank() == 0 {
        println!("Test distributed algorithms on {} ranks:", world.size());
    }

    test_distributed_scan(&world);
    test_sample_sort_contiguous(&world);
    test_sample_sort_random(&world);
    test_partition_balances(&world);
    test_remove_duplicates(&world);
    test_linearize(&world);
    test_sorted_range_count(&world);
    test_complete_octree(&world);
    test_block_partition(&world);
    test_points2octree(&world);
}
