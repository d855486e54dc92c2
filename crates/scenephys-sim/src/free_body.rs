//! Semi-implicit Euler integration of unconstrained rigid bodies.
//!
//! There is no collision detection, so without a support the bodies only
//! come to rest under the data forces. Gravity is therefore off by default.

use std::collections::BTreeMap;

use glam::{DMat3, DQuat, DVec3};
use scenephys_3d::pose::Isometry;
use scenephys_forces::{ObjectHandle, RigidBodyAccess, Wrench};
use serde::{Deserialize, Serialize};

use crate::{DynamicsWorld, RigidBodyDesc};

/// Integrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Gravity acceleration in m/s².
    pub gravity: DVec3,
    /// Linear velocity damping rate in 1/s.
    pub linear_damping: f64,
    /// Angular velocity damping rate in 1/s.
    pub angular_damping: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            gravity: DVec3::ZERO,
            linear_damping: 5.0,
            angular_damping: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
struct FreeBody {
    /// pose of the body frame
    pose: Isometry,
    cog_offset: DVec3,
    mass: f64,
    inertia: DVec3,
    linear_velocity: DVec3,
    angular_velocity: DVec3,
    force: DVec3,
    torque: DVec3,
}

impl FreeBody {
    fn center_of_gravity(&self) -> DVec3 {
        self.pose.transform_vec3(self.cog_offset)
    }

    /// World frame inertia tensor `R * I * R^T`.
    fn world_inertia(&self) -> DMat3 {
        let rot = DMat3::from_quat(self.pose.rotation);
        rot * DMat3::from_diagonal(self.inertia) * rot.transpose()
    }

    fn world_inertia_inv(&self) -> DMat3 {
        let rot = DMat3::from_quat(self.pose.rotation);
        rot * DMat3::from_diagonal(self.inertia.recip()) * rot.transpose()
    }

    fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.linear_velocity.length_squared()
            + 0.5 * self.angular_velocity.dot(self.world_inertia() * self.angular_velocity)
    }
}

/// A world of free rigid bodies integrated with semi-implicit Euler.
#[derive(Debug, Default)]
pub struct FreeBodyWorld {
    config: IntegratorConfig,
    bodies: BTreeMap<ObjectHandle, FreeBody>,
    next_id: u64,
}

impl FreeBodyWorld {
    /// Create an empty world.
    pub fn new(config: IntegratorConfig) -> Self {
        Self {
            config,
            bodies: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// The integrator settings.
    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the world has no bodies.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Linear velocity of the center of gravity.
    pub fn linear_velocity(&self, handle: ObjectHandle) -> Option<DVec3> {
        self.bodies.get(&handle).map(|b| b.linear_velocity)
    }

    /// Angular velocity in the world frame.
    pub fn angular_velocity(&self, handle: ObjectHandle) -> Option<DVec3> {
        self.bodies.get(&handle).map(|b| b.angular_velocity)
    }

    /// Set the velocities of a body. Returns `false` if it is unknown.
    pub fn set_velocity(&mut self, handle: ObjectHandle, linear: DVec3, angular: DVec3) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        body.linear_velocity = linear;
        body.angular_velocity = angular;
        true
    }
}

impl RigidBodyAccess for FreeBodyWorld {
    fn pose(&self, handle: ObjectHandle) -> Option<Isometry> {
        self.bodies.get(&handle).map(|b| b.pose)
    }

    fn center_of_gravity_offset(&self, handle: ObjectHandle) -> Option<DVec3> {
        self.bodies.get(&handle).map(|b| b.cog_offset)
    }

    fn mass(&self, handle: ObjectHandle) -> Option<f64> {
        self.bodies.get(&handle).map(|b| b.mass)
    }

    fn gravity(&self) -> DVec3 {
        self.config.gravity
    }

    fn apply_wrench(&mut self, handle: ObjectHandle, wrench: &Wrench) -> bool {
        let Some(body) = self.bodies.get_mut(&handle) else {
            return false;
        };
        body.force += wrench.force;
        body.torque += wrench.torque;
        true
    }
}

impl DynamicsWorld for FreeBodyWorld {
    fn add_body(&mut self, desc: RigidBodyDesc) -> ObjectHandle {
        let handle = ObjectHandle::new(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            handle,
            FreeBody {
                pose: desc.pose,
                cog_offset: desc.cog_offset,
                mass: desc.mass,
                inertia: desc.inertia,
                linear_velocity: DVec3::ZERO,
                angular_velocity: DVec3::ZERO,
                force: DVec3::ZERO,
                torque: DVec3::ZERO,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: ObjectHandle) -> bool {
        self.bodies.remove(&handle).is_some()
    }

    fn kinetic_energy(&self, handle: ObjectHandle) -> Option<f64> {
        self.bodies.get(&handle).map(FreeBody::kinetic_energy)
    }

    fn step(&mut self, dt: f64) {
        let linear_decay = 1.0 / (1.0 + dt * self.config.linear_damping.max(0.0));
        let angular_decay = 1.0 / (1.0 + dt * self.config.angular_damping.max(0.0));

        for body in self.bodies.values_mut() {
            let cog = body.center_of_gravity();

            // velocities first, then positions with the new velocities
            let acceleration = body.force / body.mass + self.config.gravity;
            body.linear_velocity = (body.linear_velocity + acceleration * dt) * linear_decay;
            let angular_acceleration = body.world_inertia_inv() * body.torque;
            body.angular_velocity =
                (body.angular_velocity + angular_acceleration * dt) * angular_decay;

            let new_cog = cog + body.linear_velocity * dt;
            let delta = DQuat::from_scaled_axis(body.angular_velocity * dt);
            let rotation = (delta * body.pose.rotation).normalize();

            // rotate about the center of gravity
            body.pose = Isometry::new(rotation, new_cog - rotation * body.cog_offset);

            body.force = DVec3::ZERO;
            body.torque = DVec3::ZERO;
        }
    }

    fn clear(&mut self) {
        self.bodies.clear();
    }

    fn set_gravity(&mut self, gravity: DVec3) {
        self.config.gravity = gravity;
    }

    fn handles(&self) -> Vec<ObjectHandle> {
        self.bodies.keys().copied().collect()
    }
}
