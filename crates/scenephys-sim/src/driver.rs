use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use glam::DVec3;
use scenephys_3d::pose::Isometry;
use scenephys_forces::{CorrespondenceForceGenerator, ObjectHandle, RigidBodyAccess};
use serde::{Deserialize, Serialize};

use crate::{
    DriverConfig, DynamicsWorld, FreeBodyWorld, RigidBodyDesc, SimulationConfig, SimulationError,
    StepSample, SteadyStateConfig, SteadyStateDetector,
};

/// Latest pose of every tracked object by label, shared with a viewer.
pub type PoseSnapshot = Arc<Mutex<BTreeMap<String, Isometry>>>;

/// Where the driver is in a simulation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No step taken since the last reset.
    Idle,
    /// Stepping, not converged yet.
    Running,
    /// Converged. Further steps are no-ops until a reset.
    Steady,
}

/// An object to settle, with its initial pose estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Unique label of the object.
    pub label: String,
    /// Name of the registered model cloud.
    pub model_name: String,
    /// Initial pose estimate, object frame to scene frame.
    pub pose: Isometry,
    /// Center of gravity in the object frame.
    #[serde(default)]
    pub cog_offset: DVec3,
    /// Mass in kg.
    #[serde(default = "TrackedObject::default_mass")]
    pub mass: f64,
    /// Principal moments of inertia about the center of gravity, in kg·m².
    #[serde(default = "TrackedObject::default_inertia")]
    pub inertia: DVec3,
}

impl TrackedObject {
    fn default_mass() -> f64 {
        0.1
    }

    fn default_inertia() -> DVec3 {
        DVec3::splat(1e-4)
    }

    /// Create an object with default mass properties.
    pub fn new(label: impl Into<String>, model_name: impl Into<String>, pose: Isometry) -> Self {
        Self {
            label: label.into(),
            model_name: model_name.into(),
            pose,
            cog_offset: DVec3::ZERO,
            mass: Self::default_mass(),
            inertia: Self::default_inertia(),
        }
    }

    /// Set the mass properties.
    pub fn with_mass(mut self, mass: f64, inertia: DVec3) -> Self {
        self.mass = mass;
        self.inertia = inertia;
        self
    }

    /// Set the center of gravity in the object frame.
    pub fn with_cog_offset(mut self, cog_offset: DVec3) -> Self {
        self.cog_offset = cog_offset;
        self
    }

    fn validate(&self) -> Result<(), SimulationError> {
        let inertia_ok = self.inertia.is_finite() && self.inertia.min_element() > 0.0;
        if !(self.mass > 0.0 && self.mass.is_finite()) || !inertia_ok {
            return Err(SimulationError::InvalidConfig(format!(
                "object {} needs a positive mass and inertia",
                self.label
            )));
        }
        if !self.pose.is_finite() || !self.cog_offset.is_finite() {
            return Err(SimulationError::InvalidConfig(format!(
                "object {} has a non finite pose",
                self.label
            )));
        }
        Ok(())
    }

    fn body_desc(&self) -> RigidBodyDesc {
        RigidBodyDesc {
            pose: self.pose,
            mass: self.mass,
            inertia: self.inertia,
            cog_offset: self.cog_offset,
        }
    }
}

/// Outcome of [`SimulationDriver::simulate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Steps taken by this call.
    pub steps: usize,
    /// Whether steady state was reached within the step budget.
    pub reached_steady_state: bool,
    /// Final pose of every object by label.
    pub poses: BTreeMap<String, Isometry>,
    /// Registration confidence of every object at its final pose.
    pub confidences: BTreeMap<String, f64>,
}

/// Steps a dynamics world under feedback forces until the tracked objects settle.
pub struct SimulationDriver<W: DynamicsWorld> {
    world: W,
    generator: CorrespondenceForceGenerator,
    config: DriverConfig,
    detector: SteadyStateDetector,
    objects: BTreeMap<ObjectHandle, TrackedObject>,
    state: DriverState,
    total_steps: usize,
    snapshot: PoseSnapshot,
    debug: bool,
}

impl SimulationDriver<FreeBodyWorld> {
    /// Build a driver over a [`FreeBodyWorld`] from a configuration.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut generator = CorrespondenceForceGenerator::new(config.forces.clone())?;
        generator.set_feedback_force_mode(config.feedback_mode);
        Self::new(
            FreeBodyWorld::new(config.integrator.clone()),
            generator,
            config.driver.clone(),
            config.steady_state.clone(),
        )
    }
}

impl<W: DynamicsWorld> SimulationDriver<W> {
    /// Create a driver. Bodies already in `world` are not tracked.
    pub fn new(
        world: W,
        generator: CorrespondenceForceGenerator,
        config: DriverConfig,
        steady_state: SteadyStateConfig,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            world,
            generator,
            config,
            detector: SteadyStateDetector::new(steady_state),
            objects: BTreeMap::new(),
            state: DriverState::Idle,
            total_steps: 0,
            snapshot: Arc::new(Mutex::new(BTreeMap::new())),
            debug: false,
        })
    }

    /// The force generator, e.g. to set the scene data.
    pub fn generator(&self) -> &CorrespondenceForceGenerator {
        &self.generator
    }

    /// Mutable access to the force generator.
    pub fn generator_mut(&mut self) -> &mut CorrespondenceForceGenerator {
        &mut self.generator
    }

    /// The dynamics world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// The driver state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Steps taken since the last reset.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Set the gravity of the dynamics world.
    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.world.set_gravity(gravity);
    }

    /// Log per step diagnostics at debug level, here and in the generator.
    pub fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
        self.generator.set_debug_mode(debug);
    }

    /// Add one object to the simulation.
    pub fn add_object(&mut self, object: TrackedObject) -> Result<ObjectHandle, SimulationError> {
        let mut handles = self.add_objects(vec![object])?;
        handles
            .pop()
            .ok_or_else(|| SimulationError::InvalidConfig("no object added".to_string()))
    }

    /// Add objects to the simulation, all or none.
    ///
    /// Labels must be unique and every model must be registered with the
    /// generator. Adding objects starts a new pass.
    pub fn add_objects(
        &mut self,
        objects: Vec<TrackedObject>,
    ) -> Result<Vec<ObjectHandle>, SimulationError> {
        let mut labels = self
            .objects
            .values()
            .map(|o| o.label.as_str())
            .collect::<Vec<_>>();
        for object in &objects {
            if labels.contains(&object.label.as_str()) {
                return Err(SimulationError::DuplicateObject(object.label.clone()));
            }
            labels.push(object.label.as_str());
            self.generator.models().get(&object.model_name)?;
            object.validate()?;
        }

        let mut handles = Vec::with_capacity(objects.len());
        for object in objects {
            let handle = self.world.add_body(object.body_desc());
            log::info!(
                "Added {} ({}) as {}",
                object.label,
                object.model_name,
                handle
            );
            self.objects.insert(handle, object);
            handles.push(handle);
        }

        self.detector.reset();
        self.state = DriverState::Idle;
        self.publish_snapshot();
        Ok(handles)
    }

    /// Handle of the object labelled `label`.
    pub fn handle_of(&self, label: &str) -> Option<ObjectHandle> {
        self.objects
            .iter()
            .find(|(_, o)| o.label == label)
            .map(|(h, _)| *h)
    }

    /// The tracked objects as added, by handle.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &TrackedObject)> {
        self.objects.iter().map(|(h, o)| (*h, o))
    }

    /// Remove every tracked body and its cached correspondence, and go back to idle.
    pub fn reset_objects(&mut self) {
        for handle in self.objects.keys() {
            self.world.remove_body(*handle);
            self.generator.remove_cached_icp_result(*handle);
        }
        log::info!("Removed {} objects", self.objects.len());
        self.objects.clear();
        self.detector.reset();
        self.state = DriverState::Idle;
        self.total_steps = 0;
        self.publish_snapshot();
    }

    /// Rerun ICP for every object at its current pose.
    pub fn update_cached_icp_results(&mut self) -> Result<(), SimulationError> {
        for (handle, object) in &self.objects {
            let Some(pose) = self.world.pose(*handle) else {
                continue;
            };
            self.generator
                .update_cached_icp_result(*handle, &object.model_name, &pose)?;
        }
        Ok(())
    }

    /// Run ICP for the objects that have no cache entry yet. Seeded entries are kept.
    fn build_missing_cache_entries(&mut self) -> Result<(), SimulationError> {
        for (handle, object) in &self.objects {
            if self.generator.cache().contains(*handle) {
                continue;
            }
            let Some(pose) = self.world.pose(*handle) else {
                continue;
            };
            self.generator
                .update_cached_icp_result(*handle, &object.model_name, &pose)?;
        }
        Ok(())
    }

    /// Record the motion of one step and update the state.
    pub fn record_step(&mut self, sample: &StepSample) -> DriverState {
        if self.state == DriverState::Steady {
            return self.state;
        }
        let steady = self.detector.update(sample);
        let next = if steady {
            DriverState::Steady
        } else {
            DriverState::Running
        };
        if next != self.state {
            log::info!("Driver state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.state
    }

    /// Apply the feedback forces, advance the world one time step and check convergence.
    ///
    /// A failing force computation only zeroes that object's contribution.
    /// A steady driver does not step.
    pub fn step(&mut self) -> Result<DriverState, SimulationError> {
        if self.state == DriverState::Steady {
            return Ok(self.state);
        }
        if !self.generator.has_scene_data() {
            return Err(scenephys_forces::ForceError::MissingSceneData.into());
        }

        let mut previous = Vec::with_capacity(self.objects.len());
        for (handle, object) in &self.objects {
            let Some(pose) = self.world.pose(*handle) else {
                log::warn!("Object {} has no body", object.label);
                continue;
            };
            previous.push((*handle, pose));
            if let Err(err) =
                self.generator
                    .apply_feedback_forces(&mut self.world, *handle, &object.model_name)
            {
                log::warn!("No feedback force on {}: {}", object.label, err);
            }
        }

        self.world.step(self.config.time_step);
        self.total_steps += 1;

        let mut sample = StepSample::default();
        for (handle, before) in previous {
            let Some(after) = self.world.pose(handle) else {
                continue;
            };
            sample.max_translation_delta = sample
                .max_translation_delta
                .max(before.translation_distance(&after));
            sample.max_rotation_delta = sample
                .max_rotation_delta
                .max(before.rotation_angle(&after));
            sample.kinetic_energy += self.world.kinetic_energy(handle).unwrap_or(0.0);
        }

        let level = if self.debug {
            log::Level::Debug
        } else {
            log::Level::Trace
        };
        log::log!(
            level,
            "Step {}: translation {:.3e} m, rotation {:.3e} rad, energy {:.3e} J",
            self.total_steps,
            sample.max_translation_delta,
            sample.max_rotation_delta,
            sample.kinetic_energy
        );

        let state = self.record_step(&sample);
        self.publish_snapshot();
        Ok(state)
    }

    /// Step until steady state or until the step budget is spent.
    pub fn simulate(&mut self) -> Result<SimulationReport, SimulationError> {
        if self.state == DriverState::Idle && self.config.build_cache_on_start {
            self.build_missing_cache_entries()?;
        }

        let mut steps = 0;
        while self.state != DriverState::Steady && steps < self.config.max_steps {
            self.step()?;
            steps += 1;
        }

        let reached_steady_state = self.state == DriverState::Steady;
        if reached_steady_state {
            log::info!("Steady state after {} steps", self.total_steps);
        } else {
            log::warn!("No steady state within {} steps", steps);
        }

        let mut confidences = BTreeMap::new();
        for (handle, object) in &self.objects {
            let Some(pose) = self.world.pose(*handle) else {
                continue;
            };
            let confidence = self.generator.icp_confidence(&object.model_name, &pose)?;
            confidences.insert(object.label.clone(), confidence);
        }

        Ok(SimulationReport {
            steps,
            reached_steady_state,
            poses: self.current_poses(),
            confidences,
        })
    }

    /// Current pose of every object by label.
    pub fn current_poses(&self) -> BTreeMap<String, Isometry> {
        self.objects
            .iter()
            .filter_map(|(handle, object)| {
                self.world
                    .pose(*handle)
                    .map(|pose| (object.label.clone(), pose))
            })
            .collect()
    }

    /// Settle the objects if not steady yet and return their poses by label.
    pub fn updated_object_poses(&mut self) -> Result<BTreeMap<String, Isometry>, SimulationError> {
        if self.state != DriverState::Steady {
            self.simulate()?;
        }
        Ok(self.current_poses())
    }

    /// Pose of the object labelled `label`.
    pub fn object_pose(&self, label: &str) -> Result<Isometry, SimulationError> {
        self.handle_of(label)
            .and_then(|handle| self.world.pose(handle))
            .ok_or_else(|| SimulationError::UnknownObject(label.to_string()))
    }

    /// Shared poses, republished after every step.
    pub fn pose_snapshot(&self) -> PoseSnapshot {
        Arc::clone(&self.snapshot)
    }

    fn publish_snapshot(&self) {
        let poses = self.current_poses();
        match self.snapshot.lock() {
            Ok(mut guard) => *guard = poses,
            Err(err) => log::warn!("Pose snapshot not published: {}", err),
        }
    }
}

impl<W: DynamicsWorld + std::fmt::Debug> std::fmt::Debug for SimulationDriver<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("world", &self.world)
            .field("state", &self.state)
            .field("total_steps", &self.total_steps)
            .field("objects", &self.objects.len())
            .finish()
    }
}
