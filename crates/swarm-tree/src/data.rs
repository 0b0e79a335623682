//! Point fixtures for tests, benchmarks and drivers.

use rand::prelude::*;
use rand::SeedableRng;

use crate::constants::DIMENSION;
use crate::types::point::PointType;

/// Generate `npoints` uniformly distributed positions in the unit box,
/// reproducible from `seed`.
pub fn random_points(npoints: usize, seed: u64) -> Vec<[PointType; DIMENSION]> {
    let mut range = StdRng::seed_from_u64(seed);
    let between = rand::distributions::Uniform::from(0.0..1.0);

    let mut points = Vec::with_capacity(npoints);
    for _ in 0..npoints {
        let mut point = [0.0; DIMENSION];
        for coord in point.iter_mut() {
            *coord = between.sample(&mut range);
        }
        points.push(point);
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproducible() {
        let a = random_points(100, 0);
        let b = random_points(100, 0);
        let c = random_points(100, 1);

        assert_eq!(a, b);
        assert_ne!(a, c);

        for point in a.iter() {
            for &coord in point.iter() {
                assert!((0.0..1.0).contains(&coord));
            }
        }
    }
}
