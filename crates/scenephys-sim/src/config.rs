use std::path::Path;

use scenephys_forces::{FeedbackForceMode, ForceParameters};
use serde::{Deserialize, Serialize};

use crate::{IntegratorConfig, SimulationError, SteadyStateConfig};

/// Stepping settings of the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Integration step in seconds.
    pub time_step: f64,
    /// Step budget of a single [`crate::SimulationDriver::simulate`] call.
    pub max_steps: usize,
    /// Register objects without a cached correspondence at the start of a run.
    pub build_cache_on_start: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 240.0,
            max_steps: 2000,
            build_cache_on_start: true,
        }
    }
}

impl DriverConfig {
    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(SimulationError::InvalidConfig(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        Ok(())
    }
}

/// Everything needed to set up a simulation, loadable from a JSON file.
///
/// Every field is optional in the file; missing ones take their default.
///
/// ```json
/// {
///   "feedback_mode": "cached_icp",
///   "forces": { "forces_magnitude_per_point": 1.0 },
///   "driver": { "max_steps": 500 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Force generator tunables.
    pub forces: ForceParameters,
    /// Correspondence strategy.
    pub feedback_mode: FeedbackForceMode,
    /// Stepping settings.
    pub driver: DriverConfig,
    /// Convergence thresholds.
    pub steady_state: SteadyStateConfig,
    /// Settings of the built in integrator.
    pub integrator: IntegratorConfig,
}

impl SimulationConfig {
    /// Read and validate a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: SimulationConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section is in range.
    pub fn validate(&self) -> Result<(), SimulationError> {
        self.forces.validate()?;
        self.driver.validate()?;
        if self.steady_state.required_consecutive_steps == 0 {
            return Err(SimulationError::InvalidConfig(
                "required_consecutive_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
