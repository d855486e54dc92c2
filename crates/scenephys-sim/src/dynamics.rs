use glam::DVec3;
use scenephys_3d::pose::Isometry;
use scenephys_forces::{ObjectHandle, RigidBodyAccess};
use serde::{Deserialize, Serialize};

/// Physical description of a rigid body to add to a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDesc {
    /// Initial world pose of the body frame.
    pub pose: Isometry,
    /// Mass in kg.
    pub mass: f64,
    /// Principal moments of inertia about the center of gravity, body frame, in kg·m².
    pub inertia: DVec3,
    /// Center of gravity in the body frame.
    pub cog_offset: DVec3,
}

/// The rigid body solver the driver steps.
///
/// Handles are issued by the world and stay valid until the body is removed.
pub trait DynamicsWorld: RigidBodyAccess {
    /// Add a body and return its handle.
    fn add_body(&mut self, desc: RigidBodyDesc) -> ObjectHandle;

    /// Remove a body. Returns `false` if it was unknown.
    fn remove_body(&mut self, handle: ObjectHandle) -> bool;

    /// Kinetic energy of a body in J.
    fn kinetic_energy(&self, handle: ObjectHandle) -> Option<f64>;

    /// Advance the world by `dt` seconds, consuming the applied wrenches.
    fn step(&mut self, dt: f64);

    /// Remove every body.
    fn clear(&mut self);

    /// Set the gravity acceleration in m/s².
    fn set_gravity(&mut self, gravity: DVec3);

    /// Handles of every body.
    fn handles(&self) -> Vec<ObjectHandle>;
}
