//! Weak scaling of the distributed tree construction: a fixed number of
//! points per rank, grown by adding ranks.

use std::collections::HashMap;
use std::time::Instant;

use mpi::collective::SystemOperation;
use mpi::topology::Color;
use mpi::traits::*;

use swarm_tree::constants::NCRIT;
use swarm_tree::data::random_points;
use swarm_tree::distributed::DistributedTree;
use swarm_tree::types::domain::Domain;

const NPOINTS: usize = 100000;

pub type Times = HashMap<String, u128>;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let world = world.split_by_color(Color::with_value(0)).unwrap();
    let rank = world.rank();
    let size = world.size();

    let points = random_points(NPOINTS, rank as u64);
    let domain = Domain::from_extent(1.0);

    let mut times: Times = HashMap::new();
    let start = Instant::now();
    let tree = DistributedTree::new(&points, &domain, NCRIT, &world);
    times.insert("total".to_string(), start.elapsed().as_millis());

    let nleaves = tree.keys.len() as u64;
    let mut total_leaves = 0u64;
    world.all_reduce_into(&nleaves, &mut total_leaves, SystemOperation::sum());

    let root_rank = 0;
    if rank == root_rank {
        println!(
            "ranks: {}, points/rank: {}, leaves: {}, total: {} ms",
            size,
            NPOINTS,
            total_leaves,
            times.get(&"total".to_string()).unwrap()
        );
    }
}
