use serde::{Deserialize, Serialize};

/// Thresholds below which a step counts as quiet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteadyStateConfig {
    /// Largest per step translation of any object, in meters.
    pub translation_threshold: f64,
    /// Largest per step rotation of any object, in radians.
    pub rotation_threshold: f64,
    /// Total kinetic energy of the tracked objects, in J.
    pub kinetic_energy_threshold: f64,
    /// Number of consecutive quiet steps before the run is steady.
    pub required_consecutive_steps: usize,
}

impl Default for SteadyStateConfig {
    fn default() -> Self {
        Self {
            translation_threshold: 1e-4,
            rotation_threshold: 1e-3,
            kinetic_energy_threshold: 1e-5,
            required_consecutive_steps: 10,
        }
    }
}

/// Motion measured over one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepSample {
    /// Largest translation of any object during the step, in meters.
    pub max_translation_delta: f64,
    /// Largest rotation of any object during the step, in radians.
    pub max_rotation_delta: f64,
    /// Total kinetic energy after the step, in J.
    pub kinetic_energy: f64,
}

/// Declares steady state once enough consecutive quiet steps were seen.
///
/// A single loud step resets the count, so crossing zero velocity while
/// oscillating is never mistaken for convergence.
#[derive(Debug, Clone)]
pub struct SteadyStateDetector {
    config: SteadyStateConfig,
    consecutive: usize,
}

impl SteadyStateDetector {
    /// Create a detector with no quiet steps recorded.
    pub fn new(config: SteadyStateConfig) -> Self {
        Self {
            config,
            consecutive: 0,
        }
    }

    /// The thresholds in use.
    pub fn config(&self) -> &SteadyStateConfig {
        &self.config
    }

    /// Whether `sample` is below every threshold.
    pub fn is_quiet(&self, sample: &StepSample) -> bool {
        sample.max_translation_delta < self.config.translation_threshold
            && sample.max_rotation_delta < self.config.rotation_threshold
            && sample.kinetic_energy < self.config.kinetic_energy_threshold
    }

    /// Record one step and return whether steady state is reached.
    pub fn update(&mut self, sample: &StepSample) -> bool {
        if self.is_quiet(sample) {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        self.is_steady()
    }

    /// Whether the last `required_consecutive_steps` steps were quiet.
    pub fn is_steady(&self) -> bool {
        self.consecutive >= self.config.required_consecutive_steps.max(1)
    }

    /// Number of quiet steps in a row so far.
    pub fn consecutive_steps(&self) -> usize {
        self.consecutive
    }

    /// Forget every recorded step.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
