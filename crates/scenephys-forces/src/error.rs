use std::path::PathBuf;

use crate::cache::ObjectHandle;

/// Errors raised while configuring or querying the force generator.
///
/// These are configuration errors: they point at a setup bug, never at a
/// transient lack of evidence. Missing evidence yields a zero wrench instead.
#[derive(Debug, thiserror::Error)]
pub enum ForceError {
    /// No scene observation has been set yet.
    #[error("Scene data must be set before computing feedback forces")]
    MissingSceneData,

    /// The named model has not been registered.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The model directory does not exist.
    #[error("Model directory not found: {}", .0.display())]
    ModelDirectoryNotFound(PathBuf),

    /// A model was requested from disk before a directory was configured.
    #[error("Model directory has not been set")]
    ModelDirectoryNotSet,

    /// A model cloud without points was registered.
    #[error("Model cloud {0} has no points")]
    EmptyModelCloud(String),

    /// The rigid body is unknown to the dynamics world.
    #[error("Unknown object {0}")]
    UnknownObject(ObjectHandle),

    /// A force parameter is out of its valid range.
    #[error("Invalid force parameter {name}: {value}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// Failed to read a model cloud.
    #[error(transparent)]
    Pcd(#[from] scenephys_3d::io::pcd::PcdError),
}
