#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`SimulationDriver`] steps a [`DynamicsWorld`] in fixed increments,
//! pushes every tracked body toward the observed scene with the feedback
//! forces of a [`CorrespondenceForceGenerator`](scenephys_forces::CorrespondenceForceGenerator)
//! and stops once motion has stayed below threshold for a sustained number of
//! steps.

/// Simulation configuration loaded from JSON.
pub mod config;
pub use config::{DriverConfig, SimulationConfig};

/// The simulation driver state machine.
pub mod driver;
pub use driver::{DriverState, PoseSnapshot, SimulationDriver, SimulationReport, TrackedObject};

mod dynamics;
pub use dynamics::{DynamicsWorld, RigidBodyDesc};

mod error;
pub use error::SimulationError;

/// A contact free rigid body integrator.
pub mod free_body;
pub use free_body::{FreeBodyWorld, IntegratorConfig};

/// Sustained threshold convergence detection.
pub mod steady_state;
pub use steady_state::{StepSample, SteadyStateConfig, SteadyStateDetector};
