//! The bug's shape and its projection into world-space voxels.

use voxbug_shared::{edit::VoxelDescriptor, math::Vec3};

use crate::motion::{Pose, BUG_VOXEL_SIZE};

/// One voxel of the bug in local (voxel-unit) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BugPart {
    pub offset: Vec3,
    pub color: [u8; 3],
}

const fn part(x: f32, y: f32, z: f32, color: [u8; 3]) -> BugPart {
    BugPart {
        offset: Vec3::new(x, y, z),
        color,
    }
}

const TAIL: [u8; 3] = [51, 51, 153];
const BODY: [u8; 3] = [255, 200, 0];
const HEAD: [u8; 3] = [200, 0, 0];
const EYES: [u8; 3] = [64, 64, 64];
const WINGS: [u8; 3] = [0, 153, 0];
const LEGS: [u8; 3] = [153, 200, 0];

pub const VOXELS_PER_BUG: usize = 18;

/// Index of the head voxel; audio is positioned there.
pub const VOICE_PART_INDEX: usize = 5;

/// Scale from bug world units to audio space.
pub const VOICE_POSITION_SCALE: f32 = 128.0;

pub static BUG_PARTS: [BugPart; VOXELS_PER_BUG] = [
    // tail
    part(0.0, 0.0, -3.0, TAIL),
    part(0.0, 0.0, -2.0, TAIL),
    part(0.0, 0.0, -1.0, TAIL),
    // body
    part(0.0, 0.0, 0.0, BODY),
    part(0.0, 0.0, 1.0, BODY),
    // head
    part(0.0, 0.0, 2.0, HEAD),
    // eyes
    part(1.0, 0.0, 3.0, EYES),
    part(-1.0, 0.0, 3.0, EYES),
    // wings
    part(3.0, 1.0, 1.0, WINGS),
    part(2.0, 1.0, 1.0, WINGS),
    part(1.0, 0.0, 1.0, WINGS),
    part(-1.0, 0.0, 1.0, WINGS),
    part(-2.0, 1.0, 1.0, WINGS),
    part(-3.0, 1.0, 1.0, WINGS),
    // legs
    part(2.0, -1.0, 0.0, LEGS),
    part(1.0, -1.0, 0.0, LEGS),
    part(-1.0, -1.0, 0.0, LEGS),
    part(-2.0, -1.0, 0.0, LEGS),
];

/// Places every part of `layout` in the world according to `pose`.
///
/// Offsets are scaled to voxel size, mirrored in x when the bug faces -x,
/// yawed by `pose.rotation`, then translated to `pose.position`.
pub fn project(pose: &Pose, layout: &[BugPart]) -> Vec<VoxelDescriptor> {
    let mirror = if pose.direction.x < 0.0 { -1.0 } else { 1.0 };
    layout
        .iter()
        .map(|part| {
            let mut local = part.offset * BUG_VOXEL_SIZE;
            local.x *= mirror;
            VoxelDescriptor {
                position: local.rotate_y(pose.rotation) + pose.position,
                size: BUG_VOXEL_SIZE,
                color: part.color,
            }
        })
        .collect()
}

/// Where the bug's voice comes from, in audio-space coordinates.
pub fn voice_point(descriptors: &[VoxelDescriptor]) -> Option<Vec3> {
    descriptors
        .get(VOICE_PART_INDEX)
        .map(|d| d.position * VOICE_POSITION_SCALE)
}
