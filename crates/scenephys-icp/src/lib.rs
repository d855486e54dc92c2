#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod icp_vanilla;
pub use icp_vanilla::*;

mod nn;
pub use nn::{Neighbor, SceneIndex};

mod ops;
pub use ops::fit_transformation;

/// Error types for the registration module.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// The source cloud has no points.
    #[error("ICP source cloud is empty")]
    EmptySource,

    /// The target index has no points.
    #[error("ICP target cloud is empty")]
    EmptyTarget,

    /// Not enough correspondences survived outlier rejection to fit a rigid transform.
    #[error("Need at least 3 correspondences for transformation estimation. Got: {0}")]
    NotEnoughCorrespondences(usize),
}
