use glam::DVec3;
use scenephys_3d::pose::Isometry;

use crate::{ObjectHandle, Wrench};

/// Access to the rigid bodies the generator pushes on.
///
/// Implemented by the dynamics world. Every getter returns `None` for an
/// unknown handle.
pub trait RigidBodyAccess {
    /// Current world pose of the body.
    fn pose(&self, handle: ObjectHandle) -> Option<Isometry>;

    /// Center of gravity in the body frame.
    fn center_of_gravity_offset(&self, handle: ObjectHandle) -> Option<DVec3>;

    /// Mass in kg.
    fn mass(&self, handle: ObjectHandle) -> Option<f64>;

    /// Gravity acceleration in m/s².
    fn gravity(&self) -> DVec3;

    /// Add `wrench` to the external loads of the body for the next step.
    ///
    /// Returns `false` if the body is unknown.
    fn apply_wrench(&mut self, handle: ObjectHandle, wrench: &Wrench) -> bool;
}
