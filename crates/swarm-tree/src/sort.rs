//! Sequential multiway merges and a distributed sample sort.

use mpi::{
    datatype::{Partition, PartitionMut},
    topology::UserCommunicator,
    traits::*,
    Count,
};

use crate::distribute::{displacements, split_into_runs};

/// Merge a collection of sorted arrays into a single sorted array.
///
/// Stable with respect to the order of the input arrays: equal elements keep
/// the relative order of the arrays they came from. Runs in linear time per
/// round over log-many pairwise rounds.
pub fn merge_sorted_arrays<T: Ord>(arrays: Vec<Vec<T>>) -> Vec<T> {
    let mut runs = arrays;

    while runs.len() > 1 {
        let mut merged = Vec::with_capacity((runs.len() + 1) / 2);
        let mut pairs = runs.into_iter();
        while let Some(left) = pairs.next() {
            match pairs.next() {
                Some(right) => merged.push(merge_pair(left, right)),
                None => merged.push(left),
            }
        }
        runs = merged;
    }

    runs.pop().unwrap_or_default()
}

/// Two way merge, ties resolved in favour of the left array.
fn merge_pair<T: Ord>(left: Vec<T>, right: Vec<T>) -> Vec<T> {
    let mut result = Vec::with_capacity(left.len() + right.len());

    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => r < l,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };

        if take_right {
            result.push(right.next().unwrap());
        } else {
            result.push(left.next().unwrap());
        }
    }

    result
}

/// Select `nsamples` evenly spaced elements, anchored at the front.
fn select_samples<T: Ord + Clone>(sorted: &[T], nsamples: usize) -> Vec<T> {
    if sorted.is_empty() || nsamples == 0 {
        return Vec::new();
    }

    let step = (sorted.len() / nsamples).max(1);
    sorted.iter().step_by(step).take(nsamples).cloned().collect()
}

/// Sort a distributed sequence so that every process ends up with a
/// contiguous, locally sorted slice of the global Morton order.
///
/// Classic sample sort: sort locally, gather `P - 1` evenly spaced samples
/// per process on the first process, merge them and broadcast every
/// `(P - 1)`-th merged sample as a splitter, exchange the splitter buckets
/// all-to-all and merge what arrives. Needs at least two processes; with one
/// the caller should sort sequentially instead.
pub fn sample_sort<T>(local: &mut Vec<T>, world: &UserCommunicator)
where
    T: Equivalence + Ord + Default + Clone,
{
    let rank = world.rank();
    let size = world.size();
    debug_assert!(size > 1);

    let nsplitters = (size - 1) as usize;

    // 1. Sort the local slice sequentially.
    local.sort();

    // 2. Gather the local samples on the first process. Empty slices
    // contribute nothing.
    let samples = select_samples(local, nsplitters);
    let nsamples = samples.len() as Count;
    let root_process = world.process_at_rank(0);

    let mut splitters = vec![T::default(); nsplitters];

    if rank == 0 {
        let mut counts = vec![0 as Count; size as usize];
        root_process.gather_into_root(&nsamples, &mut counts[..]);

        let displs = displacements(&counts);
        let total: Count = counts.iter().sum();
        let mut gathered = vec![T::default(); total as usize];
        {
            let mut partition = PartitionMut::new(&mut gathered[..], counts.clone(), &displs[..]);
            root_process.gather_varcount_into_root(&samples[..], &mut partition);
        }

        // The samples of each process arrive sorted, merge the runs and take
        // every (P - 1)-th element as a splitter.
        let merged = merge_sorted_arrays(split_into_runs(&gathered, &counts));
        if !merged.is_empty() {
            for (i, splitter) in splitters.iter_mut().enumerate() {
                let idx = (i + 1) * nsplitters;
                *splitter = merged[idx.min(merged.len() - 1)].clone();
            }
        }
    } else {
        root_process.gather_into(&nsamples);
        root_process.gather_varcount_into(&samples[..]);
    }

    root_process.broadcast_into(&mut splitters[..]);

    // 3. Bucket the sorted local slice against the splitters. Elements equal
    // to a splitter land in the bucket above it.
    let mut boundaries = Vec::with_capacity(size as usize + 1);
    boundaries.push(0);
    for splitter in splitters.iter() {
        boundaries.push(local.partition_point(|x| x < splitter));
    }
    boundaries.push(local.len());

    let mut send_counts = vec![0 as Count; size as usize];
    for (i, count) in send_counts.iter_mut().enumerate() {
        *count = (boundaries[i + 1] - boundaries[i]) as Count;
    }

    // 4. Exchange bucket sizes, then the buckets themselves.
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

    // 5. The incoming buckets are sorted runs, merge them.
    *local = merge_sorted_arrays(split_into_runs(&received, &recv_counts));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sorted_arrays() {
        let arrays = vec![vec![1, 4, 9], vec![], vec![2, 3, 5], vec![0, 10]];

        let merged = merge_sorted_arrays(arrays);

        assert_eq!(merged, vec![0, 1, 2, 3, 4, 5, 9, 10]);
    }

    #[test]
    fn test_merge_empty() {
        let arrays: Vec<Vec<u64>> = Vec::new();
        assert!(merge_sorted_arrays(arrays).is_empty());

        let arrays: Vec<Vec<u64>> = vec![Vec::new(), Vec::new()];
        assert!(merge_sorted_arrays(arrays).is_empty());
    }

    #[test]
    fn test_merge_is_stable() {
        // Equal keys keep the order of their source arrays.
        let arrays = vec![vec![(1, 'a'), (2, 'a')], vec![(1, 'b')], vec![(1, 'c')]];

        let merged = merge_sorted_arrays_by_key(arrays);

        assert_eq!(merged, vec![(1, 'a'), (1, 'b'), (1, 'c'), (2, 'a')]);
    }

    /// Helper wrapper so the stability test can order on the first tuple
    /// entry only.
    fn merge_sorted_arrays_by_key(arrays: Vec<Vec<(u64, char)>>) -> Vec<(u64, char)> {
        use std::cmp::Ordering;

        struct Keyed(u64, char);

        impl PartialEq for Keyed {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl Eq for Keyed {}

        impl Ord for Keyed {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl PartialOrd for Keyed {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let arrays = arrays
            .into_iter()
            .map(|run| run.into_iter().map(|(k, tag)| Keyed(k, tag)).collect())
            .collect();

        merge_sorted_arrays(arrays)
            .into_iter()
            .map(|Keyed(k, tag)| (k, tag))
            .collect()
    }

    #[test]
    fn test_select_samples() {
        let sorted: Vec<u64> = (0..256).collect();

        let samples = select_samples(&sorted, 3);
        assert_eq!(samples, vec![0, 85, 170]);

        assert!(select_samples(&sorted, 0).is_empty());
        let empty: Vec<u64> = Vec::new();
        assert!(select_samples(&empty, 3).is_empty());

        // More samples than elements just yields the whole array.
        let short: Vec<u64> = vec![7, 8];
        assert_eq!(select_samples(&short, 5), vec![7, 8]);
    }
}
