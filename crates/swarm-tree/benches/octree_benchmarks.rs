use criterion::{black_box, criterion_group, criterion_main, Criterion};

use swarm_tree::constants::DIMENSION;
use swarm_tree::data::random_points;
use swarm_tree::octree::Tree;
use swarm_tree::sort::merge_sorted_arrays;
use swarm_tree::types::{domain::Domain, morton::MortonKey};

fn benchmark_morton_encoding(c: &mut Criterion) {
    let npoints = 1000000;
    let points = random_points(npoints, 0);

    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };

    c.bench_function("morton encoding", |b| {
        b.iter(|| {
            for point in points.iter() {
                black_box(MortonKey::from_point(point, &domain));
            }
        })
    });
}

fn benchmark_complete_region(c: &mut Criterion) {
    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };

    let a = MortonKey::from_point(&[0.01; DIMENSION], &domain);
    let b = MortonKey::from_point(&[0.99; DIMENSION], &domain);

    c.bench_function("complete region", |bench| {
        bench.iter(|| Tree::complete_region(black_box(&a), black_box(&b)))
    });
}

fn benchmark_merge_sorted_arrays(c: &mut Criterion) {
    let domain = Domain {
        origin: [0.0; DIMENSION],
        diameter: [1.0; DIMENSION],
    };

    let nruns = 16;
    let mut runs: Vec<Vec<MortonKey>> = Vec::new();
    for seed in 0..nruns {
        let mut keys: Vec<MortonKey> = random_points(10000, seed)
            .iter()
            .map(|p| MortonKey::from_point(p, &domain))
            .collect();
        keys.sort();
        runs.push(keys);
    }

    c.bench_function("merge sorted arrays", |b| {
        b.iter(|| merge_sorted_arrays(black_box(runs.clone())))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30).measurement_time(std::time::Duration::from_secs(10));
    targets = benchmark_morton_encoding,
              benchmark_complete_region,
              benchmark_merge_sorted_arrays,
}
criterion_main!(benches);
