#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing point clouds.
pub mod io;

/// Point cloud container and bounding boxes.
pub mod pointcloud;

/// Rigid body poses.
pub mod pose;

/// Voxel grid downsampling.
pub mod voxel_grid;
