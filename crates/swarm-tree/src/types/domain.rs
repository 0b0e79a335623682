//! Definition of the simulation domain.

use memoffset::offset_of;
use mpi::{
    collective::SystemOperation,
    datatype::{Equivalence, UncommittedUserDatatype, UserDatatype},
    topology::UserCommunicator,
    traits::*,
    Address, Count,
};

use crate::constants::DIMENSION;
use crate::types::point::PointType;

/// The axis aligned box that all boid positions fall in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Domain {
    pub origin: [PointType; DIMENSION],
    pub diameter: [PointType; DIMENSION],
}

unsafe impl Equivalence for Domain {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
            &[1, 1],
            &[
                offset_of!(Domain, origin) as Address,
                offset_of!(Domain, diameter) as Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(
                    DIMENSION as Count,
                    &PointType::equivalent_datatype(),
                )
                .as_ref(),
                UncommittedUserDatatype::contiguous(
                    DIMENSION as Count,
                    &PointType::equivalent_datatype(),
                )
                .as_ref(),
            ],
        )
    }
}

impl Domain {
    /// The domain of a grid with a given extent along each axis, anchored at
    /// the origin.
    pub fn from_extent(extent: PointType) -> Domain {
        Domain {
            origin: [0.0; DIMENSION],
            diameter: [extent; DIMENSION],
        }
    }

    /// Compute the bounds of a set of process local points.
    pub fn from_local_points(points: &[[PointType; DIMENSION]]) -> Domain {
        let mut lower = [PointType::MAX; DIMENSION];
        let mut upper = [PointType::MIN; DIMENSION];

        for point in points.iter() {
            for dim in 0..DIMENSION {
                lower[dim] = lower[dim].min(point[dim]);
                upper[dim] = upper[dim].max(point[dim]);
            }
        }

        let mut diameter = [0.0; DIMENSION];
        for dim in 0..DIMENSION {
            diameter[dim] = upper[dim] - lower[dim];
        }

        Domain {
            origin: lower,
            diameter,
        }
    }

    /// Compute the bounds over the points of all processes.
    pub fn from_global_points(
        points: &[[PointType; DIMENSION]],
        world: &UserCommunicator,
    ) -> Domain {
        let local = Domain::from_local_points(points);

        let mut upper = [0.0; DIMENSION];
        for dim in 0..DIMENSION {
            upper[dim] = local.origin[dim] + local.diameter[dim];
        }

        let mut global_lower = [0.0; DIMENSION];
        let mut global_upper = [0.0; DIMENSION];
        world.all_reduce_into(
            &local.origin[..],
            &mut global_lower[..],
            SystemOperation::min(),
        );
        world.all_reduce_into(&upper[..], &mut global_upper[..], SystemOperation::max());

        let mut diameter = [0.0; DIMENSION];
        for dim in 0..DIMENSION {
            diameter[dim] = global_upper[dim] - global_lower[dim];
        }

        Domain {
            origin: global_lower,
            diameter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_bounds() {
        let points = vec![[0.25; DIMENSION], [0.5; DIMENSION], [0.75; DIMENSION]];

        let domain = Domain::from_local_points(&points);

        assert_eq!(domain.origin, [0.25; DIMENSION]);
        assert_eq!(domain.diameter, [0.5; DIMENSION]);
    }

    #[test]
    fn test_from_extent() {
        let domain = Domain::from_extent(100.0);

        assert_eq!(domain.origin, [0.0; DIMENSION]);
        assert_eq!(domain.diameter, [100.0; DIMENSION]);
    }
}
