//! Bug motion.
//!
//! Two paths: a straight line that bounces along z, and a circular orbit.
//! Both are pure functions of the current pose; there is no randomness.

use voxbug_shared::{
    config::MotionMode,
    math::{radians, Vec3, TWO_PI},
};

/// Edge length of one bug voxel, in world units.
pub const BUG_VOXEL_SIZE: f32 = 0.0625 / 128.0;

/// Where the bug is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub direction: Vec3,
    /// Angle along the orbit, radians.
    pub path_angle: f32,
    /// Yaw applied to the bug's shape, radians.
    pub rotation: f32,
    pub mode: MotionMode,
}

/// Path parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub linear_start: Vec3,
    pub linear_direction: Vec3,
    pub linear_step: f32,
    /// Direction flips to -z once position.z exceeds this.
    pub z_upper: f32,
    /// Direction flips to +z once position.z drops below this.
    pub z_lower: f32,
    pub path_center: Vec3,
    pub path_radius: f32,
    /// Orbit advance per tick, radians.
    pub angle_delta: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            linear_start: Vec3::new(20.0, 30.0, 20.0) * BUG_VOXEL_SIZE,
            linear_direction: Vec3::new(0.0, 0.0, 1.0),
            linear_step: BUG_VOXEL_SIZE,
            z_upper: 1.0,
            z_lower: BUG_VOXEL_SIZE,
            path_center: Vec3::new(150.0, 30.0, 150.0) * BUG_VOXEL_SIZE,
            path_radius: 40.0 * BUG_VOXEL_SIZE,
            angle_delta: radians(0.2),
        }
    }
}

impl MotionParams {
    fn orbit_point(&self, angle: f32) -> Vec3 {
        Vec3::new(
            self.path_center.x + self.path_radius * angle.cos(),
            self.path_center.y,
            self.path_center.z + self.path_radius * angle.sin(),
        )
    }
}

/// Owns the bug's pose and advances it one tick at a time.
#[derive(Debug, Clone)]
pub struct MotionModel {
    params: MotionParams,
    pose: Pose,
}

impl MotionModel {
    pub fn new(mode: MotionMode) -> Self {
        Self::with_params(mode, MotionParams::default())
    }

    pub fn with_params(mode: MotionMode, params: MotionParams) -> Self {
        let position = match mode {
            MotionMode::Linear => params.linear_start,
            MotionMode::Orbital => params.orbit_point(0.0),
        };
        Self {
            params,
            pose: Pose {
                position,
                direction: params.linear_direction,
                path_angle: 0.0,
                rotation: 0.0,
                mode,
            },
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// Moves the bug one tick along its path and returns the new pose.
    pub fn advance(&mut self) -> Pose {
        let p = &self.params;
        let pose = &mut self.pose;
        match pose.mode {
            MotionMode::Linear => {
                pose.position += pose.direction * p.linear_step;
                if pose.position.z > p.z_upper {
                    pose.direction.z = -1.0;
                }
                if pose.position.z < p.z_lower {
                    pose.direction.z = 1.0;
                }
            }
            MotionMode::Orbital => {
                pose.path_angle += p.angle_delta;
                pose.rotation -= p.angle_delta;
                // Angle and rotation reset together, not modulo.
                if pose.path_angle > TWO_PI {
                    pose.path_angle = 0.0;
                    pose.rotation = 0.0;
                }
                pose.position = p.orbit_point(pose.path_angle);
            }
        }
        *pose
    }
}
