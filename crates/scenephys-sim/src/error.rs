use scenephys_forces::ForceError;

/// Errors raised while setting up or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The force generator rejected its configuration.
    #[error(transparent)]
    Force(#[from] ForceError),

    /// No tracked object has this label.
    #[error("Unknown object: {0}")]
    UnknownObject(String),

    /// An object with this label is already tracked.
    #[error("Duplicate object label: {0}")]
    DuplicateObject(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file is not valid JSON for [`crate::SimulationConfig`].
    #[error("Failed to parse configuration")]
    Config(#[from] serde_json::Error),

    /// Failed to read a file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
