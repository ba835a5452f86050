use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    blend_local_matrix, ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext,
};
use crate::link::ControllerTarget;
use crate::math::{compose, lerp_euler, position_of, quat_from_euler, rotation_of};
use crate::state::BoneStateList;

/// Space a transform is applied in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoordinateFrame {
    #[default]
    BoneLocal,
    Component,
    TargetBone,
}

/// Where the transformator takes its transform from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputSource {
    /// Interpolate between the minimum and maximum by the targets.
    #[default]
    TargetBlend,
    /// Read the targets' controller vectors as the transform.
    TargetDirect,
    /// Pose of the input bone.
    BoneState,
    /// Inverse pose of the input bone.
    BoneStateInverse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoneTransformatorRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub minimum_translation: Vec3,
    pub maximum_translation: Vec3,
    /// Euler angles in radians.
    pub minimum_rotation: Vec3,
    pub maximum_rotation: Vec3,
    pub minimum_scaling: Vec3,
    pub maximum_scaling: Vec3,
    /// Rotate about `axis` by an interpolated angle instead of Euler angles.
    pub use_axis: bool,
    pub axis: Vec3,
    pub minimum_angle: f32,
    pub maximum_angle: f32,
    pub coordinate_frame: CoordinateFrame,
    pub target_bone: Option<String>,
    pub input_source: InputSource,
    pub input_bone: Option<String>,
    pub target_translation: ControllerTarget,
    pub target_rotation: ControllerTarget,
    pub target_scaling: ControllerTarget,
}

impl Default for BoneTransformatorRuleDef {
    fn default() -> Self {
        Self {
            common: RuleCommonDef::default(),
            channels: ChannelFlags::default(),
            minimum_translation: Vec3::ZERO,
            maximum_translation: Vec3::ZERO,
            minimum_rotation: Vec3::ZERO,
            maximum_rotation: Vec3::ZERO,
            minimum_scaling: Vec3::ONE,
            maximum_scaling: Vec3::ONE,
            use_axis: false,
            axis: Vec3::Z,
            minimum_angle: 0.0,
            maximum_angle: 0.0,
            coordinate_frame: CoordinateFrame::BoneLocal,
            target_bone: None,
            input_source: InputSource::TargetBlend,
            input_bone: None,
            target_translation: ControllerTarget::default(),
            target_rotation: ControllerTarget::default(),
            target_scaling: ControllerTarget::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoneTransformatorRule {
    pub(super) common: RuleCommon,
    def: BoneTransformatorRuleDef,
    target_bone: Option<usize>,
    input_bone: Option<usize>,
}

impl BoneTransformatorRule {
    pub(super) fn new(def: &BoneTransformatorRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
            target_bone: None,
            input_bone: None,
        }
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.target_bone = self
            .def
            .target_bone
            .as_deref()
            .and_then(|n| params.bones.index_of(n));
        self.input_bone = self
            .def
            .input_bone
            .as_deref()
            .and_then(|n| params.bones.index_of(n));
    }

    fn rotation_between(&self, t: f32) -> Quat {
        if self.def.use_axis {
            let (min, max) = (self.def.minimum_angle, self.def.maximum_angle);
            let angle = min + (max - min) * t;
            Quat::from_axis_angle(self.def.axis.normalize_or(Vec3::Z), angle)
        } else {
            quat_from_euler(lerp_euler(
                self.def.minimum_rotation,
                self.def.maximum_rotation,
                t,
            ))
        }
    }

    /// The transform for this pass; `None` when the input bone is missing.
    fn transform(&self, bones: &BoneStateList, ctx: &RuleContext<'_>) -> Option<Mat4> {
        let def = &self.def;
        let matrix = match def.input_source {
            InputSource::TargetBlend => {
                let translation = ctx.target_value(&def.target_translation, 0.0);
                let rotation = ctx.target_value(&def.target_rotation, 0.0);
                let scaling = ctx.target_value(&def.target_scaling, 0.0);
                compose(
                    def.minimum_translation
                        .lerp(def.maximum_translation, translation),
                    self.rotation_between(rotation),
                    def.minimum_scaling.lerp(def.maximum_scaling, scaling),
                )
            }
            InputSource::TargetDirect => {
                let rotation = if def.use_axis {
                    let angle = ctx.target_value(&def.target_rotation, def.minimum_angle);
                    Quat::from_axis_angle(def.axis.normalize_or(Vec3::Z), angle)
                } else {
                    ctx.target_quaternion(
                        &def.target_rotation,
                        quat_from_euler(def.minimum_rotation),
                    )
                };
                compose(
                    ctx.target_vector(&def.target_translation, def.minimum_translation),
                    rotation,
                    ctx.target_vector(&def.target_scaling, def.minimum_scaling),
                )
            }
            InputSource::BoneState => bones.pose(self.input_bone?).matrix(),
            InputSource::BoneStateInverse => bones.pose(self.input_bone?).matrix().inverse(),
        };
        Some(matrix)
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let mask = self.channels().mask();
        if !mask.any() {
            return;
        }
        let Some(transform) = self.transform(bones, ctx) else {
            return;
        };
        let mode = self.common.blend_mode();

        let frame = match self.def.coordinate_frame {
            CoordinateFrame::BoneLocal => None,
            CoordinateFrame::Component => Some(Mat4::IDENTITY),
            CoordinateFrame::TargetBone => {
                Some(self.target_bone.map_or(Mat4::IDENTITY, |t| bones.global_matrix(t)))
            }
        };

        for &bone in self.common.bones() {
            let new_local = match frame {
                None => bones.pose(bone).matrix() * transform,
                Some(frame) => {
                    let global = bones.global_matrix(bone);
                    // rotate and scale about the bone's own origin, along the frame's axes
                    let pivot = Mat4::from_translation(position_of(&global));
                    let axes = Mat4::from_quat(rotation_of(&frame));
                    let to_frame = pivot * axes;
                    let moved = to_frame * transform * to_frame.inverse() * global;
                    bones.local_pose_from_global(bone, &moved).matrix()
                }
            };
            blend_local_matrix(bones, bone, &new_local, mode, factor, mask);
        }
    }

    fn channels(&self) -> &ChannelFlags {
        &self.def.channels
    }
}
