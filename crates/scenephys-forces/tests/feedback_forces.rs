use approx::assert_relative_eq;
use glam::DVec3;
use scenephys_3d::{pointcloud::PointCloud, pose::Isometry};
use scenephys_forces::{
    CorrespondenceForceGenerator, FeedbackForceMode, ForceError, ForceParameters, ObjectHandle,
    RigidBodyAccess, Wrench,
};

const SHIFT: [f64; 3] = [0.02, 0.0, 0.0];

/// 100 points on a sphere of radius 0.5 m: a Fibonacci spiral over the upper
/// hemisphere plus the antipode of every point, so the centroid is the origin.
fn sphere_points() -> Vec<[f64; 3]> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    let mut points = Vec::with_capacity(100);
    for i in 0..50 {
        let z = (i as f64 + 0.5) / 50.0;
        let r = (1.0 - z * z).sqrt();
        let phi = i as f64 * golden_angle;
        let p = [0.5 * r * phi.cos(), 0.5 * r * phi.sin(), 0.5 * z];
        points.push(p);
        points.push([-p[0], -p[1], -p[2]]);
    }
    points
}

fn shifted(points: &[[f64; 3]], shift: [f64; 3]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| [p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]])
        .collect()
}

fn sphere_generator(mode: FeedbackForceMode) -> Result<CorrespondenceForceGenerator, ForceError> {
    let mut generator = CorrespondenceForceGenerator::new(ForceParameters::default())?;
    generator.set_model_cloud("sphere", PointCloud::new(sphere_points()))?;
    generator.set_scene_data(PointCloud::new(shifted(&sphere_points(), SHIFT)));
    generator.set_forces_parameter(1.0, 0.1)?;
    generator.set_feedback_force_mode(mode);
    Ok(generator)
}

#[derive(Default)]
struct Bodies {
    pose: Option<Isometry>,
    mass: f64,
    gravity: DVec3,
    applied: Vec<Wrench>,
}

impl RigidBodyAccess for Bodies {
    fn pose(&self, handle: ObjectHandle) -> Option<Isometry> {
        (handle.id() == 0).then_some(self.pose?)
    }

    fn center_of_gravity_offset(&self, handle: ObjectHandle) -> Option<DVec3> {
        (handle.id() == 0).then_some(DVec3::ZERO)
    }

    fn mass(&self, handle: ObjectHandle) -> Option<f64> {
        (handle.id() == 0).then_some(self.mass)
    }

    fn gravity(&self) -> DVec3 {
        self.gravity
    }

    fn apply_wrench(&mut self, handle: ObjectHandle, wrench: &Wrench) -> bool {
        if handle.id() != 0 {
            return false;
        }
        self.applied.push(*wrench);
        true
    }
}

#[test]
fn test_shifted_sphere_closest_point() -> Result<(), ForceError> {
    let generator = sphere_generator(FeedbackForceMode::ClosestPoint)?;
    let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "sphere")?;

    assert_relative_eq!(wrench.force.x, 2.0, epsilon = 1e-9);
    assert_relative_eq!(wrench.force.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(wrench.force.z, 0.0, epsilon = 1e-9);
    assert_relative_eq!(wrench.torque.length(), 0.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_shifted_sphere_with_registration() -> Result<(), ForceError> {
    for mode in [
        FeedbackForceMode::FrameByFrameIcp,
        FeedbackForceMode::CachedIcp,
    ] {
        let generator = sphere_generator(mode)?;
        let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "sphere")?;
        assert_relative_eq!(wrench.force.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(wrench.force.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(wrench.torque.length(), 0.0, epsilon = 1e-6);
        assert!(generator.cache().is_empty());
    }
    Ok(())
}

#[test]
fn test_empty_scene_gives_zero_wrench() -> Result<(), ForceError> {
    for mode in FeedbackForceMode::ALL {
        let mut generator = sphere_generator(mode)?;
        generator.set_scene_data(PointCloud::default());
        let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "sphere")?;
        assert!(wrench.is_zero());
        assert_eq!(
            generator.icp_confidence("sphere", &Isometry::IDENTITY)?,
            0.0
        );
    }
    Ok(())
}

#[test]
fn test_far_pairs_contribute_nothing() -> Result<(), ForceError> {
    let mut generator = CorrespondenceForceGenerator::default();
    generator.set_model_cloud(
        "pair",
        PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]),
    )?;
    // only the first model point has a scene point within the threshold
    generator.set_scene_data(PointCloud::new(vec![[0.0, 0.005, 0.0], [1.0, 0.5, 0.0]]));
    generator.set_forces_parameter(1.0, 0.01)?;

    let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "pair")?;
    assert_relative_eq!(wrench.force.y, 0.005, epsilon = 1e-12);
    assert_relative_eq!(wrench.force.x, 0.0, epsilon = 1e-12);
    assert_relative_eq!(wrench.torque.length(), 0.0, epsilon = 1e-12);

    // nothing survives a tighter threshold
    generator.set_forces_parameter(1.0, 0.001)?;
    let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "pair")?;
    assert!(wrench.is_zero());
    Ok(())
}

#[test]
fn test_confidence_query_is_pure() -> Result<(), ForceError> {
    let generator = sphere_generator(FeedbackForceMode::CachedIcp)?;
    let pose = Isometry::from_translation(DVec3::new(0.005, 0.0, 0.0));

    let first = generator.icp_confidence("sphere", &pose)?;
    let second = generator.icp_confidence("sphere", &pose)?;
    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first));
    assert!(generator.cache().is_empty());
    Ok(())
}

#[test]
fn test_cached_confidence_decays_with_divergence() -> Result<(), ForceError> {
    let mut generator = sphere_generator(FeedbackForceMode::CachedIcp)?;
    let handle = ObjectHandle::new(0);
    let entry = generator.update_cached_icp_result(handle, "sphere", &Isometry::IDENTITY)?;
    let Some(entry) = entry.cloned() else {
        panic!("the sphere scene supports a registration");
    };
    assert_relative_eq!(entry.confidence(), 1.0);

    let model = sphere_points();
    let decay = generator.parameters().confidence_decay_distance;
    let mut previous = f64::INFINITY;
    for i in 0..20 {
        let pose = Isometry::from_axis_angle(
            DVec3::Z,
            i as f64 * 0.01,
            DVec3::new(i as f64 * 0.002, 0.0, 0.0),
        );
        let confidence = entry.effective_confidence(&model, &pose, decay);
        assert!(confidence <= previous);
        previous = confidence;
    }
    assert!(previous < entry.confidence());
    Ok(())
}

#[test]
fn test_removed_entry_is_rebuilt() -> Result<(), ForceError> {
    let mut generator = sphere_generator(FeedbackForceMode::CachedIcp)?;
    let handle = ObjectHandle::new(4);

    // seed with a pose far from the scene, so the entry pulls the wrong way
    let stale_pose = Isometry::from_translation(DVec3::new(-0.03, 0.0, 0.0));
    generator.manual_set_cached_icp_result_from_pose(handle, "sphere", &stale_pose)?;
    let stale = generator.compute_wrench(handle, "sphere", &Isometry::IDENTITY, DVec3::ZERO)?;
    assert!(stale.force.x < 0.0);

    assert!(generator.remove_cached_icp_result(handle).is_some());
    let fresh = generator.compute_wrench(handle, "sphere", &Isometry::IDENTITY, DVec3::ZERO)?;
    assert_relative_eq!(fresh.force.x, 2.0, epsilon = 1e-6);

    let Some(entry) = generator.cached_icp_result(handle) else {
        panic!("the cache was rebuilt");
    };
    assert_eq!(entry.build_pose(), &Isometry::IDENTITY);

    generator.reset_cached_icp_result();
    assert!(generator.cache().is_empty());
    Ok(())
}

#[test]
fn test_apply_caps_force_to_weight() -> Result<(), ForceError> {
    let mut generator = sphere_generator(FeedbackForceMode::ClosestPoint)?;
    let mut bodies = Bodies {
        pose: Some(Isometry::IDENTITY),
        mass: 0.1,
        gravity: DVec3::new(0.0, 0.0, -9.81),
        ..Default::default()
    };

    let wrench = generator.apply_feedback_forces(&mut bodies, ObjectHandle::new(0), "sphere")?;
    let max_force = 0.5 * 0.1 * 9.81;
    assert_relative_eq!(wrench.force.length(), max_force, epsilon = 1e-9);
    assert_eq!(bodies.applied, vec![wrench]);

    // without gravity there is no cap
    bodies.gravity = DVec3::ZERO;
    let wrench = generator.apply_feedback_forces(&mut bodies, ObjectHandle::new(0), "sphere")?;
    assert_relative_eq!(wrench.force.x, 2.0, epsilon = 1e-9);

    assert!(matches!(
        generator.apply_feedback_forces(&mut bodies, ObjectHandle::new(9), "sphere"),
        Err(ForceError::UnknownObject(_))
    ));
    Ok(())
}

#[test]
fn test_model_scale_scales_force() -> Result<(), ForceError> {
    let mut generator = sphere_generator(FeedbackForceMode::ClosestPoint)?;
    generator.set_model_force_scale("sphere", 0.5)?;
    let wrench = generator.apply_feedback_forces_debug(&Isometry::IDENTITY, "sphere")?;
    assert_relative_eq!(wrench.force.x, 1.0, epsilon = 1e-9);
    Ok(())
}
