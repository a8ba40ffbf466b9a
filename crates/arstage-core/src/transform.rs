//! Rigid transforms exchanged with the XR platform

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a pose, as reported by hit tests and used
/// to offset reference spaces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Build from platform components: `[x, y, z]` and a quaternion `[x, y, z, w]`
    pub fn from_components(position: [f64; 3], orientation: [f64; 4]) -> Self {
        let position = Vec3::new(position[0] as f32, position[1] as f32, position[2] as f32);
        let orientation = Quat::from_xyzw(
            orientation[0] as f32,
            orientation[1] as f32,
            orientation[2] as f32,
            orientation[3] as f32,
        );
        // platform quaternions drift slightly off unit length
        let orientation = if orientation.length_squared() > f32::EPSILON {
            orientation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self::new(position, orientation)
    }

    /// Homogeneous position `[x, y, z, 1]` for platform point constructors
    pub fn position_components(&self) -> [f64; 4] {
        [
            self.position.x as f64,
            self.position.y as f64,
            self.position.z as f64,
            1.0,
        ]
    }

    /// Quaternion `[x, y, z, w]`
    pub fn orientation_components(&self) -> [f64; 4] {
        let [x, y, z, w] = self.orientation.to_array();
        [x as f64, y as f64, z as f64, w as f64]
    }

    /// Pure rotation about the vertical axis
    pub fn yaw(radians: f32) -> Self {
        Self::new(Vec3::ZERO, Quat::from_rotation_y(radians))
    }

    /// Apply `other` in the frame of `self`
    pub fn then(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            position: self.position + self.orientation * other.position,
            orientation: (self.orientation * other.orientation).normalize(),
        }
    }
}
