use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    blend_local_matrix, ChannelFlags, CoordinateFrame, ParamContext, RuleCommon, RuleCommonDef,
};
use crate::blend::{BlendMode, Pose};
use crate::math::{compose, decompose, quat_from_euler, quat_to_euler};
use crate::state::{BoneStateList, VpsStateList};

/// Per-axis bounds; each side of each axis can be switched off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitRange {
    pub minimum: Vec3,
    pub maximum: Vec3,
    pub enable_minimum: [bool; 3],
    pub enable_maximum: [bool; 3],
}

impl LimitRange {
    pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
        Self {
            minimum,
            maximum,
            enable_minimum: [true; 3],
            enable_maximum: [true; 3],
        }
    }

    pub fn is_active(&self) -> bool {
        self.enable_minimum.iter().chain(&self.enable_maximum).any(|&e| e)
    }

    pub fn clamp(&self, value: Vec3) -> Vec3 {
        let mut out = value;
        for axis in 0..3 {
            if self.enable_minimum[axis] {
                out[axis] = out[axis].max(self.minimum[axis]);
            }
            if self.enable_maximum[axis] {
                out[axis] = out[axis].min(self.maximum[axis]);
            }
        }
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub position: LimitRange,
    /// Euler angles in radians.
    pub rotation: LimitRange,
    pub scaling: LimitRange,
    pub minimum_vertex_position_set: f32,
    pub maximum_vertex_position_set: f32,
    pub enable_vertex_position_set_minimum: bool,
    pub enable_vertex_position_set_maximum: bool,
    pub coordinate_frame: CoordinateFrame,
    pub target_bone: Option<String>,
}

/// Clamps bone pose channels and VPS weights into ranges.
#[derive(Clone, Debug)]
pub struct LimitRule {
    pub(super) common: RuleCommon,
    def: LimitRuleDef,
    target_bone: Option<usize>,
}

impl LimitRule {
    pub(super) fn new(def: &LimitRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
            target_bone: None,
        }
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.target_bone = self
            .def
            .target_bone
            .as_deref()
            .and_then(|n| params.bones.index_of(n));
    }

    /// Clamp a pose; `None` when nothing needed clamping.
    fn clamp_pose(&self, pose: &Pose) -> Option<Pose> {
        let channels = &self.def.channels;
        let mut out = *pose;
        if channels.enable_position && self.def.position.is_active() {
            out.position = self.def.position.clamp(pose.position);
        }
        if channels.enable_orientation && self.def.rotation.is_active() {
            let euler = quat_to_euler(pose.orientation);
            let clamped = self.def.rotation.clamp(euler);
            if clamped != euler {
                out.orientation = quat_from_euler(clamped);
            }
        }
        if channels.enable_size && self.def.scaling.is_active() {
            out.scale = self.def.scaling.clamp(pose.scale);
        }
        (out != *pose).then_some(out)
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        factor: f32,
    ) {
        let mode = self.common.blend_mode();
        let mask = self.def.channels.mask();

        if mask.any() {
            let frame = match self.def.coordinate_frame {
                CoordinateFrame::BoneLocal => None,
                CoordinateFrame::Component => Some(Mat4::IDENTITY),
                CoordinateFrame::TargetBone => Some(
                    self.target_bone
                        .map_or(Mat4::IDENTITY, |t| bones.global_matrix(t)),
                ),
            };
            for &bone in self.common.bones() {
                let new_local = match frame {
                    None => match self.clamp_pose(&bones.pose(bone)) {
                        Some(clamped) => clamped.matrix(),
                        None => continue,
                    },
                    Some(frame) => {
                        let global = bones.global_matrix(bone);
                        let (position, orientation, scale) =
                            decompose(&(frame.inverse() * global));
                        let Some(clamped) =
                            self.clamp_pose(&Pose::new(position, orientation, scale))
                        else {
                            continue;
                        };
                        let moved = frame
                            * compose(clamped.position, clamped.orientation, clamped.scale);
                        bones.local_pose_from_global(bone, &moved).matrix()
                    }
                };
                blend_local_matrix(bones, bone, &new_local, mode, factor, mask);
            }
        }

        if self.def.channels.enable_vertex_position_set {
            for &v in self.common.vps() {
                let weight = vps.weight(v);
                let mut clamped = weight;
                if self.def.enable_vertex_position_set_minimum {
                    clamped = clamped.max(self.def.minimum_vertex_position_set);
                }
                if self.def.enable_vertex_position_set_maximum {
                    clamped = clamped.min(self.def.maximum_vertex_position_set);
                }
                if clamped != weight {
                    let incoming = match mode {
                        BlendMode::Blend => clamped,
                        BlendMode::Overlay => clamped - weight,
                    };
                    vps.blend_weight(v, incoming, mode, factor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sides_pass_through() {
        let mut range = LimitRange::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        range.enable_maximum[1] = false;
        let out = range.clamp(Vec3::new(2.0, 2.0, -3.0));
        assert_eq!(out, Vec3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn default_range_is_inactive() {
        assert!(!LimitRange::default().is_active());
    }
}
