//! Distributed octrees for swarming simulations.
//!
//! A swarm of boids is spread over many MPI processes. The library keeps a
//! balanced, Morton sorted decomposition of space across those processes as
//! the boids move: positions are encoded to deepest level octants, sorted
//! globally with a sample sort, coarsened into a complete linear block
//! octree, and refined until no leaf holds more points than a threshold. The
//! serial and parallel construction algorithms follow Sundar et al. [1].
//!
//! [1] Sundar, Sampath, Biros (2008). Bottom-up construction and 2:1 balance
//! refinement of linear octrees in parallel. SIAM J. Sci. Comput. 30(5).
pub mod constants;
pub mod data;
pub mod distribute;
pub mod distributed;
pub mod octree;
pub mod sort;
pub mod types;
