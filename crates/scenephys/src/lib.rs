#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Re-exports the workspace crates:
//!
//! - [`k3d`]: point clouds, rigid poses, voxel grids and PCD I/O.
//! - [`icp`]: nearest neighbour search and point to point ICP.
//! - [`forces`]: the correspondence based feedback force generator.
//! - [`sim`]: the simulation driver and its steady state detection.

#[doc(inline)]
pub use scenephys_3d as k3d;

#[doc(inline)]
pub use scenephys_icp as icp;

#[doc(inline)]
pub use scenephys_forces as forces;

#[doc(inline)]
pub use scenephys_sim as sim;
