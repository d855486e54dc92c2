use std::ops::Add;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::correspondence::CorrespondenceCloud;

/// A force applied at the center of gravity plus a torque about it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wrench {
    /// Net force in N, world frame.
    pub force: DVec3,
    /// Net torque in N·m about the center of gravity, world frame.
    pub torque: DVec3,
}

impl Wrench {
    /// No force and no torque.
    pub const ZERO: Self = Self {
        force: DVec3::ZERO,
        torque: DVec3::ZERO,
    };

    /// Create a wrench from its parts.
    pub fn new(force: DVec3, torque: DVec3) -> Self {
        Self { force, torque }
    }

    /// Sum the per pair spring forces `gain * (target - model)` of a
    /// correspondence cloud, with the torque of each taken about `center_of_gravity`.
    ///
    /// Placeholder pairs contribute nothing.
    pub fn from_correspondence(
        correspondence: &CorrespondenceCloud,
        center_of_gravity: DVec3,
        gain: f64,
    ) -> Self {
        correspondence
            .pairs()
            .fold(Self::ZERO, |acc, (model, target)| {
                let model = DVec3::from_array(model);
                let force = gain * (DVec3::from_array(target) - model);
                Self {
                    force: acc.force + force,
                    torque: acc.torque + (model - center_of_gravity).cross(force),
                }
            })
    }

    /// Multiply force and torque by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            force: self.force * factor,
            torque: self.torque * factor,
        }
    }

    /// Whether force and torque are both exactly zero.
    pub fn is_zero(&self) -> bool {
        self.force == DVec3::ZERO && self.torque == DVec3::ZERO
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.force.is_finite() && self.torque.is_finite()
    }

    /// Limit the force norm to `max_force`, scaling the torque by the same ratio.
    pub fn clamp_force(&self, max_force: f64) -> Self {
        let norm = self.force.length();
        if norm <= max_force || norm == 0.0 {
            return *self;
        }
        self.scaled(max_force.max(0.0) / norm)
    }
}

impl Add for Wrench {
    type Output = Wrench;

    fn add(self, rhs: Wrench) -> Wrench {
        Wrench {
            force: self.force + rhs.force,
            torque: self.torque + rhs.torque,
        }
    }
}
