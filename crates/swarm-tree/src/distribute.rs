//! Distributed collectives over globally sorted sequences.
//!
//! Every function here is collective: all processes of the communicator call
//! it together, and every process has returned before the next collective
//! starts. Sequences are distributed as one locally sorted, contiguous slice
//! per process, with slices ordered by rank.

use mpi::{
    collective::SystemOperation,
    datatype::{Partition, PartitionMut},
    topology::{Rank, UserCommunicator},
    traits::*,
    Count,
};

use crate::octree::Tree;
use crate::sort::merge_sorted_arrays;
use crate::types::morton::{MortonKey, MortonKeys};

/// Exclusive prefix sums of per-rank counts, as send/receive displacements.
pub fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &count| {
            let displacement = *acc;
            *acc += count;
            Some(displacement)
        })
        .collect()
}

/// Split a flat exchange buffer back into its per-rank runs.
pub fn split_into_runs<T: Clone>(buffer: &[T], counts: &[Count]) -> Vec<Vec<T>> {
    let mut runs = Vec::with_capacity(counts.len());
    let mut offset = 0;
    for &count in counts.iter() {
        let count = count as usize;
        runs.push(buffer[offset..offset + count].to_vec());
        offset += count;
    }
    runs
}

/// Inclusive scan of element weights over the local slice.
pub fn local_scan<T, F>(local: &[T], weight: &F) -> Vec<u64>
where
    F: Fn(&T) -> u64,
{
    local
        .iter()
        .scan(0u64, |acc, item| {
            *acc += weight(item);
            Some(*acc)
        })
        .collect()
}

/// Inclusive scan of element weights over the whole distributed sequence.
///
/// One local scan, one cross process scan of the local totals, one shift of
/// the inclusive prefix from each rank to its successor, one offset pass.
pub fn distributed_scan<T, F>(local: &[T], weight: &F, world: &UserCommunicator) -> Vec<u64>
where
    F: Fn(&T) -> u64,
{
    let rank = world.rank();
    let size = world.size();

    let mut result = local_scan(local, weight);
    let local_total = result.last().copied().unwrap_or(0);

    let mut prefix = 0u64;
    world.scan_into(&local_total, &mut prefix, SystemOperation::sum());

    if rank < size - 1 {
        world.process_at_rank(rank + 1).send(&prefix);
    }
    if rank > 0 {
        let (previous_prefix, _) = world.process_at_rank(rank - 1).receive::<u64>();
        for value in result.iter_mut() {
            *value += previous_prefix;
        }
    }

    result
}

/// Redistribute a globally sorted sequence so that every process holds an
/// equal share of the total weight, order preserved.
///
/// With `w = total / P` and `k = total mod P`, the first `k` processes take
/// `w + 1` units of weight and the rest take `w`. The target of an element is
/// read off its exclusive scan rank, so the decision path is pure integer
/// arithmetic.
pub fn partition<T, F>(local: Vec<T>, weight: &F, world: &UserCommunicator) -> Vec<T>
where
    T: Equivalence + Ord + Default + Clone,
    F: Fn(&T) -> u64,
{
    let size = world.size();

    let scan = distributed_scan(&local, weight, world);

    let local_weight: u64 = local.iter().map(weight).sum();
    let mut total_weight = 0u64;
    world.all_reduce_into(&local_weight, &mut total_weight, SystemOperation::sum());

    let w = total_weight / size as u64;
    let k = total_weight % size as u64;

    // Elements are assigned to target ranks in scan order, so each rank's
    // share stays contiguous.
    let mut send_counts = vec![0 as Count; size as usize];
    for (&inclusive, item) in scan.iter().zip(local.iter()) {
        let exclusive = inclusive - weight(item);
        let target = if exclusive < k * (w + 1) {
            exclusive / (w + 1)
        } else {
            k + (exclusive - k * (w + 1)) / w
        };
        send_counts[target as usize] += 1;
    }

    let mut recv_counts = vec![0 as Count; size as usize];
    world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

    let send_displs = displacements(&send_counts);
    let recv_displs = displacements(&recv_counts);
    let total: Count = recv_counts.iter().sum();

    let mut received = vec![T::default(); total as usize];
    {
        let partition = Partition::new(&local[..], send_counts, &send_displs[..]);
        let mut partition_mut =
            PartitionMut::new(&mut received[..], recv_counts.clone(), &recv_displs[..]);
        world.all_to_all_varcount_into(&partition, &mut partition_mut);
    }

    merge_sorted_arrays(split_into_runs(&received, &recv_counts))
}

/// Collapse every run of `eq`-chained adjacent elements of a globally sorted
/// sequence to its first element.
///
/// Sortedness makes duplicates globally contiguous, so besides the local pass
/// only one boundary check is needed: each rank drops its front if the last
/// element of its predecessor claims it.
pub fn remove_duplicates<T, F>(local: &[T], eq: &F, world: &UserCommunicator) -> Vec<T>
where
    T: Equivalence + Clone,
    F: Fn(&T, &T) -> bool,
{
    let rank = world.rank();
    let size = world.size();

    let mut result: Vec<T> = Vec::with_capacity(local.len());
    for (i, item) in local.iter().enumerate() {
        if i == 0 || !eq(&local[i - 1], item) {
            result.push(item.clone());
        }
    }

    if rank < size - 1 {
        let msg: Vec<T> = local.last().cloned().into_iter().collect();
        world.process_at_rank(rank + 1).send(&msg[..]);
    }
    if rank > 0 {
        let (received, _) = world.process_at_rank(rank - 1).receive_vec::<T>();
        if let Some(previous_back) = received.last() {
            if let Some(front) = result.first() {
                if eq(previous_back, front) {
                    result.remove(0);
                }
            }
        }
    }

    result
}

/// Remove overlaps from a globally sorted distributed set of octants: no key
/// in the result is an ancestor of any other.
///
/// The local pass drops each key that is an ancestor of its successor; the
/// boundary pass lets each rank pop its back if it overlaps the front of its
/// successor.
pub fn linearize(local: &[MortonKey], world: &UserCommunicator) -> MortonKeys {
    let rank = world.rank();
    let size = world.size();

    let mut result = Tree::linearize_keys(local);

    if rank > 0 {
        let msg: MortonKeys = local.first().cloned().into_iter().collect();
        world.process_at_rank(rank - 1).send(&msg[..]);
    }
    if rank < size - 1 {
        let (received, _) = world.process_at_rank(rank + 1).receive_vec::<MortonKey>();
        if let Some(next_front) = received.first() {
            if let Some(back) = result.last() {
                if back.is_ancestor(next_front) {
                    result.pop();
                }
            }
        }
    }

    result
}

/// Check that a distributed sequence is globally sorted.
pub fn is_sorted_distributed<T>(local: &[T], world: &UserCommunicator) -> bool
where
    T: Equivalence + Ord + Clone,
{
    let rank = world.rank();
    let size = world.size();

    let mut local_result = local.windows(2).all(|window| window[0] <= window[1]);

    // The local front must not undercut the back of the predecessor.
    if rank < size - 1 {
        let msg: Vec<T> = local.last().cloned().into_iter().collect();
        world.process_at_rank(rank + 1).send(&msg[..]);
    }
    if rank > 0 {
        let (received, _) = world.process_at_rank(rank - 1).receive_vec::<T>();
        if let (Some(previous_back), Some(front)) = (received.last(), local.first()) {
            if front < previous_back {
                local_result = false;
            }
        }
    }

    let mut global_result = false;
    world.all_reduce_into(
        &local_result,
        &mut global_result,
        SystemOperation::logical_and(),
    );
    global_result
}

/// Count the elements of a globally sorted distributed sequence that lie in
/// the inclusive range `[lhs, rhs]`.
pub fn sorted_range_count_distributed<T>(
    local: &[T],
    lhs: &T,
    rhs: &T,
    world: &UserCommunicator,
) -> u64
where
    T: Equivalence + Ord,
{
    debug_assert!(lhs <= rhs);

    let lower = local.partition_point(|x| x < lhs);
    let upper = local.partition_point(|x| x <= rhs);
    let local_count = (upper - lower) as u64;

    let mut global_count = 0u64;
    world.all_reduce_into(&local_count, &mut global_count, SystemOperation::sum());
    global_count
}

/// Variant of [`sorted_range_count_distributed`] for bounds that are only
/// known on `root`. Every process returns the count.
pub fn sorted_range_count_from_root<T>(
    local: &[T],
    lhs: &T,
    rhs: &T,
    root: Rank,
    world: &UserCommunicator,
) -> u64
where
    T: Equivalence + Ord + Clone,
{
    let mut bounds = [lhs.clone(), rhs.clone()];
    world
        .process_at_rank(root)
        .broadcast_into(&mut bounds[..]);

    sorted_range_count_distributed(local, &bounds[0], &bounds[1], world)
}

/// Count the occurrences of a single value in a globally sorted distributed
/// sequence.
pub fn sorted_count_distributed<T>(local: &[T], value: &T, world: &UserCommunicator) -> u64
where
    T: Equivalence + Ord,
{
    sorted_range_count_distributed(local, value, value, world)
}

/// Distributed membership test on a globally sorted sequence.
pub fn sorted_search_distributed<T>(local: &[T], value: &T, world: &UserCommunicator) -> bool
where
    T: Equivalence + Ord,
{
    let local_found = local.binary_search(value).is_ok();

    let mut global_found = false;
    world.all_reduce_into(
        &local_found,
        &mut global_found,
        SystemOperation::logical_or(),
    );
    global_found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_displacements() {
        assert_eq!(displacements(&[3, 0, 2, 5]), vec![0, 3, 3, 5]);
        assert!(displacements(&[]).is_empty());
    }

    #[test]
    fn test_split_into_runs() {
        let buffer = [1, 2, 3, 4, 5];
        let runs = split_into_runs(&buffer, &[2, 0, 3]);

        assert_eq!(runs, vec![vec![1, 2], vec![], vec![3, 4, 5]]);
    }

    #[test]
    fn test_local_scan() {
        let values: Vec<u64> = vec![1, 2, 3, 4];

        let scan = local_scan(&values, &|&x| x);
        assert_eq!(scan, vec![1, 3, 6, 10]);

        let unit = local_scan(&values, &|_| 1);
        assert_eq!(unit, vec![1, 2, 3, 4]);

        let empty: Vec<u64> = Vec::new();
        assert!(local_scan(&empty, &|&x| x).is_empty());
    }
}
