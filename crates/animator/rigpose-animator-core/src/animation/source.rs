//! Authored animation data as delivered by the asset provider.
//!
//! Rotations are Euler angles in radians; the built tracks in [`super::tracks`] convert them to
//! continuity-corrected quaternions once per asset.

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    #[serde(default)]
    pub moves: Vec<Move>,
}

/// A named clip.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub name: String,
    /// Length in seconds.
    pub playtime: f32,
    #[serde(default)]
    pub bones: Vec<BoneChannel>,
    #[serde(default)]
    pub vertex_position_sets: Vec<VpsChannel>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneChannel {
    pub bone: String,
    #[serde(default)]
    pub keyframes: Vec<BoneKeyframe>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneKeyframe {
    pub time: f32,
    #[serde(default)]
    pub position: Vec3,
    /// Euler XYZ, radians.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

impl BoneKeyframe {
    pub fn new(time: f32, position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            time,
            position,
            rotation,
            scale,
        }
    }

    pub fn rotation(time: f32, rotation: Vec3) -> Self {
        Self::new(time, Vec3::ZERO, rotation, Vec3::ONE)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpsChannel {
    pub vps: String,
    #[serde(default)]
    pub keyframes: Vec<WeightKeyframe>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WeightKeyframe {
    pub time: f32,
    pub weight: f32,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}
