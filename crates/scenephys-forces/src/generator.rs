use std::path::Path;

use glam::DVec3;
use log::Level;
use scenephys_3d::{
    pointcloud::{BoundingBox, PointCloud},
    pose::Isometry,
};
use scenephys_icp::{icp_vanilla, SceneIndex};

use crate::{
    CachedCorrespondence, CorrespondenceCache, CorrespondenceCloud, CorrespondenceFilter,
    FeedbackForceMode, ForceError, ForceParameters, ModelCloud, ModelStore, ObjectHandle,
    RigidBodyAccess, Wrench,
};

/// Turns the disagreement between posed model clouds and the observed scene
/// into wrenches for the simulated rigid bodies.
///
/// The generator owns the scene index, the model clouds and the per object
/// correspondence cache. Missing configuration (no scene, unknown model) is an
/// error; missing evidence (empty scene, no surviving pair) is a zero wrench.
///
/// # Example
///
/// ```
/// use scenephys_3d::{pointcloud::PointCloud, pose::Isometry};
/// use scenephys_forces::CorrespondenceForceGenerator;
///
/// let mut generator = CorrespondenceForceGenerator::default();
/// generator.set_scene_data(PointCloud::new(vec![[0.005, 0.0, 0.0]]));
/// generator.set_model_cloud("dot", PointCloud::new(vec![[0.0, 0.0, 0.0]])).unwrap();
///
/// let wrench = generator
///     .apply_feedback_forces_debug(&Isometry::IDENTITY, "dot")
///     .unwrap();
/// assert!(wrench.force.x > 0.0);
/// ```
#[derive(Debug)]
pub struct CorrespondenceForceGenerator {
    params: ForceParameters,
    mode: FeedbackForceMode,
    models: ModelStore,
    scene: Option<SceneIndex>,
    cache: CorrespondenceCache,
    debug: bool,
}

impl Default for CorrespondenceForceGenerator {
    fn default() -> Self {
        Self {
            params: ForceParameters::default(),
            mode: FeedbackForceMode::default(),
            models: ModelStore::new(),
            scene: None,
            cache: CorrespondenceCache::new(),
            debug: false,
        }
    }
}

impl CorrespondenceForceGenerator {
    /// Create a generator with the given parameters.
    pub fn new(params: ForceParameters) -> Result<Self, ForceError> {
        params.validate()?;
        Ok(Self {
            params,
            ..Default::default()
        })
    }

    /// Replace the scene observation and rebuild its nearest neighbour index.
    ///
    /// Cached correspondences are kept.
    pub fn set_scene_data(&mut self, cloud: PointCloud) {
        log::info!("Scene data set with {} points", cloud.len());
        self.scene = Some(SceneIndex::from_cloud(cloud));
    }

    /// Whether a scene observation has been set.
    pub fn has_scene_data(&self) -> bool {
        self.scene.is_some()
    }

    /// The indexed scene observation.
    pub fn scene(&self) -> Option<&SceneIndex> {
        self.scene.as_ref()
    }

    /// Register a model cloud under `model_name`.
    pub fn set_model_cloud(
        &mut self,
        model_name: &str,
        cloud: PointCloud,
    ) -> Result<(), ForceError> {
        self.models.insert(model_name, cloud)
    }

    /// Set the directory [`Self::load_model_cloud`] reads from.
    pub fn set_model_directory(&mut self, directory: impl AsRef<Path>) -> Result<(), ForceError> {
        self.models.set_model_directory(directory)
    }

    /// Load `<model directory>/<model_name>.pcd` and register it.
    pub fn load_model_cloud(&mut self, model_name: &str) -> Result<(), ForceError> {
        self.models.load(model_name)
    }

    /// Set the force multiplier of a registered model.
    pub fn set_model_force_scale(
        &mut self,
        model_name: &str,
        scale: f64,
    ) -> Result<(), ForceError> {
        self.models.set_force_scale(model_name, scale)
    }

    /// The registered models.
    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    /// Update the per point force magnitude and the outlier distance threshold.
    ///
    /// Nothing is changed if either value is invalid.
    pub fn set_forces_parameter(
        &mut self,
        magnitude_per_point: f64,
        max_distance_threshold: f64,
    ) -> Result<(), ForceError> {
        self.set_parameters(ForceParameters {
            forces_magnitude_per_point: magnitude_per_point,
            max_point_distance_threshold: max_distance_threshold,
            ..self.params.clone()
        })
    }

    /// Replace every force parameter.
    pub fn set_parameters(&mut self, params: ForceParameters) -> Result<(), ForceError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// The current force parameters.
    pub fn parameters(&self) -> &ForceParameters {
        &self.params
    }

    /// Select the correspondence strategy.
    pub fn set_feedback_force_mode(&mut self, mode: FeedbackForceMode) {
        log::info!("Feedback force mode set to {}", mode);
        self.mode = mode;
    }

    /// The active correspondence strategy.
    pub fn feedback_force_mode(&self) -> FeedbackForceMode {
        self.mode
    }

    /// Log every computed wrench at debug level instead of trace level.
    pub fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Whether debug logging is on.
    pub fn debug_mode(&self) -> bool {
        self.debug
    }

    /// The model cloud of `model_name` placed at `pose`.
    pub fn transformed_object_cloud(
        &self,
        model_name: &str,
        pose: &Isometry,
    ) -> Result<PointCloud, ForceError> {
        let model = self.models.get(model_name)?;
        Ok(model.cloud().transformed(pose))
    }

    /// Compute the wrench on object `handle` at `pose` under the active mode.
    ///
    /// The torque is taken about `pose * cog_offset`. In cached mode a missing
    /// or mismatching cache entry is rebuilt first; no other state changes.
    pub fn compute_wrench(
        &mut self,
        handle: ObjectHandle,
        model_name: &str,
        pose: &Isometry,
        cog_offset: DVec3,
    ) -> Result<Wrench, ForceError> {
        let scene = self.scene.as_ref().ok_or(ForceError::MissingSceneData)?;
        let model = self.models.get(model_name)?;
        if scene.is_empty() {
            log::debug!("Empty scene, no feedback force on {}", handle);
            return Ok(Wrench::ZERO);
        }
        let center_of_gravity = pose.transform_vec3(cog_offset);

        let wrench = match self.mode {
            FeedbackForceMode::CachedIcp => {
                let reusable = self.cache.get(handle).is_some_and(|entry| {
                    entry.model_name() == model_name && entry.targets().len() == model.len()
                });
                if !reusable {
                    log::debug!("Cache miss for {}, running ICP", handle);
                    let entry = build_cache_entry(&self.params, scene, model_name, model, pose)
                        .unwrap_or_else(|| {
                            log::debug!("No scene support for {}, cached as unsupported", handle);
                            CachedCorrespondence::unsupported(
                                model_name,
                                *pose,
                                model.len(),
                                model.force_scale(),
                            )
                        });
                    self.cache.insert(handle, entry);
                }
                match self.cache.get(handle) {
                    Some(entry) => {
                        cached_wrench(&self.params, entry, model, pose, center_of_gravity)
                    }
                    None => Wrench::ZERO,
                }
            }
            mode => uncached_wrench(
                &self.params,
                mode,
                scene,
                model_name,
                model,
                pose,
                center_of_gravity,
            ),
        };

        log::log!(
            self.log_level(),
            "Feedback wrench on {} ({}): force {:?} torque {:?}",
            handle,
            model_name,
            wrench.force,
            wrench.torque
        );
        Ok(wrench)
    }

    /// Compute the wrench on a live body and add it to the body's loads.
    ///
    /// The force is capped relative to the body weight, see
    /// [`ForceParameters::percent_gravity_max_correction`]. A non finite
    /// wrench is replaced by zero so one bad object cannot destabilize the
    /// others.
    pub fn apply_feedback_forces<B: RigidBodyAccess + ?Sized>(
        &mut self,
        bodies: &mut B,
        handle: ObjectHandle,
        model_name: &str,
    ) -> Result<Wrench, ForceError> {
        let pose = bodies.pose(handle).ok_or(ForceError::UnknownObject(handle))?;
        let cog_offset = bodies.center_of_gravity_offset(handle).unwrap_or(DVec3::ZERO);

        let mut wrench = self.compute_wrench(handle, model_name, &pose, cog_offset)?;
        if !wrench.is_finite() {
            log::warn!("Non finite feedback wrench on {}, dropped", handle);
            wrench = Wrench::ZERO;
        }
        if let Some(mass) = bodies.mass(handle) {
            wrench = self.cap_to_gravity(wrench, mass, bodies.gravity());
        }

        if !bodies.apply_wrench(handle, &wrench) {
            return Err(ForceError::UnknownObject(handle));
        }
        Ok(wrench)
    }

    /// Compute the wrench for a model at `pose` without touching any body or the cache.
    ///
    /// The torque is taken about `pose.translation`. In cached mode a fresh
    /// registration is run and discarded.
    pub fn apply_feedback_forces_debug(
        &self,
        pose: &Isometry,
        model_name: &str,
    ) -> Result<Wrench, ForceError> {
        let scene = self.scene.as_ref().ok_or(ForceError::MissingSceneData)?;
        let model = self.models.get(model_name)?;
        if scene.is_empty() {
            return Ok(Wrench::ZERO);
        }
        Ok(uncached_wrench(
            &self.params,
            self.mode,
            scene,
            model_name,
            model,
            pose,
            pose.translation,
        ))
    }

    /// Run ICP for `handle` at `pose` and overwrite its cache entry.
    ///
    /// Returns `None` and drops the old entry if the scene has too little
    /// support around `pose` for a registration.
    pub fn update_cached_icp_result(
        &mut self,
        handle: ObjectHandle,
        model_name: &str,
        pose: &Isometry,
    ) -> Result<Option<&CachedCorrespondence>, ForceError> {
        let scene = self.scene.as_ref().ok_or(ForceError::MissingSceneData)?;
        let model = self.models.get(model_name)?;
        match build_cache_entry(&self.params, scene, model_name, model, pose) {
            Some(entry) => {
                log::debug!(
                    "Cache of {} refreshed, confidence {:.3}",
                    handle,
                    entry.confidence()
                );
                Ok(Some(self.cache.store(handle, entry)))
            }
            None => {
                log::debug!("Cache of {} dropped, no scene support", handle);
                self.cache.remove(handle);
                Ok(None)
            }
        }
    }

    /// Seed the cache of `handle` with the model posed at a trusted `pose`,
    /// bypassing ICP. The entry has full confidence at that pose.
    pub fn manual_set_cached_icp_result_from_pose(
        &mut self,
        handle: ObjectHandle,
        model_name: &str,
        pose: &Isometry,
    ) -> Result<&CachedCorrespondence, ForceError> {
        let model = self.models.get(model_name)?;
        let posed = pose.transform_points(model.points());
        let targets = posed.iter().copied().map(Some).collect();
        let entry = CachedCorrespondence::new(
            model_name,
            *pose,
            targets,
            &posed,
            self.params.confidence_voxel_size,
            model.force_scale(),
        );
        Ok(self.cache.store(handle, entry))
    }

    /// Drop every cache entry.
    pub fn reset_cached_icp_result(&mut self) {
        self.cache.clear();
    }

    /// Drop the cache entry of `handle`.
    pub fn remove_cached_icp_result(
        &mut self,
        handle: ObjectHandle,
    ) -> Option<CachedCorrespondence> {
        self.cache.remove(handle)
    }

    /// The cache entry of `handle`, if any.
    pub fn cached_icp_result(&self, handle: ObjectHandle) -> Option<&CachedCorrespondence> {
        self.cache.get(handle)
    }

    /// The correspondence cache.
    pub fn cache(&self) -> &CorrespondenceCache {
        &self.cache
    }

    /// Register the model at `pose` against the scene and score the result.
    ///
    /// Never touches the cache. Returns `0.0` when the scene is empty or has
    /// too little support around `pose`.
    pub fn icp_confidence(&self, model_name: &str, pose: &Isometry) -> Result<f64, ForceError> {
        let scene = self.scene.as_ref().ok_or(ForceError::MissingSceneData)?;
        let model = self.models.get(model_name)?;
        let confidence = build_cache_entry(&self.params, scene, model_name, model, pose)
            .map_or(0.0, |entry| entry.confidence());
        log::log!(
            self.log_level(),
            "ICP confidence of {} at {:?}: {:.3}",
            model_name,
            pose.translation,
            confidence
        );
        Ok(confidence)
    }

    fn cap_to_gravity(&self, wrench: Wrench, mass: f64, gravity: DVec3) -> Wrench {
        let max_force = self.params.percent_gravity_max_correction * mass * gravity.length();
        if !(max_force > 0.0) {
            return wrench;
        }
        wrench.clamp_force(max_force)
    }

    fn log_level(&self) -> Level {
        if self.debug {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

/// Register the posed model against the scene cropped around it.
///
/// Returns the aligned model points, or `None` when ICP cannot run.
fn register(
    params: &ForceParameters,
    scene: &SceneIndex,
    posed: &[[f64; 3]],
) -> Option<Vec<[f64; 3]>> {
    let region = BoundingBox::from_points(posed)?.expanded(params.icp_crop_margin);
    let cropped = region.crop(scene.points());
    if cropped.len() < 3 {
        log::debug!(
            "Only {} scene points around the object, skipping ICP",
            cropped.len()
        );
        return None;
    }

    let target = SceneIndex::new(cropped);
    match icp_vanilla(posed, &target, Isometry::IDENTITY, &params.icp_criteria()) {
        Ok(result) => Some(result.aligned),
        Err(err) => {
            log::debug!("ICP failed: {}", err);
            None
        }
    }
}

fn registered_correspondence(
    params: &ForceParameters,
    scene: &SceneIndex,
    posed: Vec<[f64; 3]>,
) -> Option<CorrespondenceCloud> {
    let aligned = register(params, scene, &posed)?;
    Some(CorrespondenceCloud::registered(
        posed,
        &aligned,
        scene,
        CorrespondenceFilter::aligned(params.max_point_distance_threshold),
    ))
}

fn build_cache_entry(
    params: &ForceParameters,
    scene: &SceneIndex,
    model_name: &str,
    model: &ModelCloud,
    pose: &Isometry,
) -> Option<CachedCorrespondence> {
    let posed = pose.transform_points(model.points());
    let targets = registered_correspondence(params, scene, posed.clone())?.into_targets();
    Some(CachedCorrespondence::new(
        model_name,
        *pose,
        targets,
        &posed,
        params.confidence_voxel_size,
        model.force_scale(),
    ))
}

fn cached_wrench(
    params: &ForceParameters,
    entry: &CachedCorrespondence,
    model: &ModelCloud,
    pose: &Isometry,
    center_of_gravity: DVec3,
) -> Wrench {
    let confidence =
        entry.effective_confidence(model.points(), pose, params.confidence_decay_distance);
    let Some(correspondence) = entry.correspondence_at(pose.transform_points(model.points())) else {
        return Wrench::ZERO;
    };
    let gain = params.forces_magnitude_per_point * entry.force_scale() * confidence;
    Wrench::from_correspondence(&correspondence, center_of_gravity, gain)
}

fn uncached_wrench(
    params: &ForceParameters,
    mode: FeedbackForceMode,
    scene: &SceneIndex,
    model_name: &str,
    model: &ModelCloud,
    pose: &Isometry,
    center_of_gravity: DVec3,
) -> Wrench {
    let posed = pose.transform_points(model.points());
    let gain = params.forces_magnitude_per_point * model.force_scale();

    match mode {
        FeedbackForceMode::ClosestPoint => {
            let correspondence = CorrespondenceCloud::closest_points(
                posed,
                scene,
                CorrespondenceFilter::compact(params.max_point_distance_threshold),
            );
            Wrench::from_correspondence(&correspondence, center_of_gravity, gain)
        }
        FeedbackForceMode::FrameByFrameIcp => registered_correspondence(params, scene, posed)
            .map_or(Wrench::ZERO, |correspondence| {
                Wrench::from_correspondence(&correspondence, center_of_gravity, gain)
            }),
        FeedbackForceMode::CachedIcp => build_cache_entry(params, scene, model_name, model, pose)
            .map_or(Wrench::ZERO, |entry| {
                cached_wrench(params, &entry, model, pose, center_of_gravity)
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generator_with_bar() -> Result<CorrespondenceForceGenerator, ForceError> {
        let mut generator = CorrespondenceForceGenerator::default();
        let bar = (0..5).map(|i| [i as f64 * 0.02, 0.0, 0.0]).collect::<Vec<_>>();
        generator.set_model_cloud("bar", PointCloud::new(bar))?;
        Ok(generator)
    }

    #[test]
    fn test_requires_scene() -> Result<(), ForceError> {
        let generator = generator_with_bar()?;
        assert!(matches!(
            generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "bar"),
            Err(ForceError::MissingSceneData)
        ));
        assert!(matches!(
            generator.icp_confidence("bar", &Isometry::IDENTITY),
            Err(ForceError::MissingSceneData)
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_model_fails_loudly() -> Result<(), ForceError> {
        let mut generator = generator_with_bar()?;
        generator.set_scene_data(PointCloud::new(vec![[0.0, 0.0, 0.0]]));
        for mode in FeedbackForceMode::ALL {
            generator.set_feedback_force_mode(mode);
            assert!(matches!(
                generator.compute_wrench(
                    ObjectHandle::new(0),
                    "cup",
                    &Isometry::IDENTITY,
                    DVec3::ZERO
                ),
                Err(ForceError::ModelNotFound(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn test_set_forces_parameter() -> Result<(), ForceError> {
        let mut generator = CorrespondenceForceGenerator::default();
        generator.set_forces_parameter(2.0, 0.05)?;
        assert_eq!(generator.parameters().forces_magnitude_per_point, 2.0);
        assert_eq!(generator.parameters().max_point_distance_threshold, 0.05);

        assert!(generator.set_forces_parameter(-1.0, 0.05).is_err());
        assert!(generator.set_forces_parameter(1.0, 0.0).is_err());
        assert_eq!(generator.parameters().forces_magnitude_per_point, 2.0);
        Ok(())
    }

    #[test]
    fn test_manual_cache_entry_has_full_confidence() -> Result<(), ForceError> {
        let mut generator = generator_with_bar()?;
        let handle = ObjectHandle::new(7);
        let pose = Isometry::from_translation(DVec3::new(0.0, 0.0, 0.1));

        let entry = generator.manual_set_cached_icp_result_from_pose(handle, "bar", &pose)?;
        assert_relative_eq!(entry.confidence(), 1.0);
        assert_eq!(entry.num_valid(), 5);
        assert_eq!(entry.build_pose(), &pose);

        assert!(generator.remove_cached_icp_result(handle).is_some());
        assert!(generator.cached_icp_result(handle).is_none());
        Ok(())
    }

    #[test]
    fn test_cached_wrench_pulls_toward_seeded_pose() -> Result<(), ForceError> {
        let mut generator = generator_with_bar()?;
        generator.set_scene_data(PointCloud::new(vec![[0.0, 0.0, 0.0]]));
        generator.set_forces_parameter(1.0, 0.05)?;
        generator.set_feedback_force_mode(FeedbackForceMode::CachedIcp);

        let handle = ObjectHandle::new(1);
        generator.manual_set_cached_icp_result_from_pose(handle, "bar", &Isometry::IDENTITY)?;

        // the bar sits 1 mm below the pose it was seeded at
        let pose = Isometry::from_translation(DVec3::new(0.0, 0.0, -0.001));
        let wrench = generator.compute_wrench(handle, "bar", &pose, DVec3::ZERO)?;
        assert!(wrench.force.z > 0.0);
        assert_relative_eq!(wrench.force.x, 0.0, epsilon = 1e-12);
        assert!(generator.cached_icp_result(handle).is_some());
        Ok(())
    }

    #[test]
    fn test_unsupported_object_stays_cached() -> Result<(), ForceError> {
        let mut generator = generator_with_bar()?;
        generator.set_scene_data(PointCloud::new(vec![[0.0, 0.0, 0.0]]));
        generator.set_feedback_force_mode(FeedbackForceMode::CachedIcp);
        let handle = ObjectHandle::new(3);

        let wrench = generator.compute_wrench(handle, "bar", &Isometry::IDENTITY, DVec3::ZERO)?;
        assert!(wrench.is_zero());
        let entry = generator.cached_icp_result(handle).cloned();
        assert!(entry.as_ref().is_some_and(|e| e.confidence() == 0.0 && e.num_valid() == 0));

        // the entry is reused, not rebuilt at the new pose
        let pose = Isometry::from_translation(DVec3::new(0.0, 0.0, 0.001));
        let wrench = generator.compute_wrench(handle, "bar", &pose, DVec3::ZERO)?;
        assert!(wrench.is_zero());
        assert_eq!(generator.cached_icp_result(handle).cloned(), entry);
        Ok(())
    }

    #[test]
    fn test_transformed_object_cloud() -> Result<(), ForceError> {
        let generator = generator_with_bar()?;
        let pose = Isometry::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let cloud = generator.transformed_object_cloud("bar", &pose)?;
        assert_eq!(cloud.len(), 5);
        assert_relative_eq!(cloud.points()[0][0], 1.0);
        Ok(())
    }
}
