use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{ChannelFlags, RuleCommon, RuleCommonDef, RuleContext};
use crate::blend::Pose;
use crate::link::ControllerTarget;
use crate::math::{lerp_euler, quat_from_euler};
use crate::state::{BoneStateList, VpsStateList};

/// Sets poses interpolated between two authored extremes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateManipulatorRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub minimum_position: Vec3,
    pub maximum_position: Vec3,
    /// Euler angles in radians.
    pub minimum_rotation: Vec3,
    pub maximum_rotation: Vec3,
    pub minimum_size: Vec3,
    pub maximum_size: Vec3,
    pub minimum_vertex_position_set: f32,
    pub maximum_vertex_position_set: f32,
    pub target_position: ControllerTarget,
    pub target_orientation: ControllerTarget,
    pub target_size: ControllerTarget,
    pub target_vertex_position_set: ControllerTarget,
}

impl Default for StateManipulatorRuleDef {
    fn default() -> Self {
        Self {
            common: RuleCommonDef::default(),
            channels: ChannelFlags::default(),
            minimum_position: Vec3::ZERO,
            maximum_position: Vec3::ZERO,
            minimum_rotation: Vec3::ZERO,
            maximum_rotation: Vec3::ZERO,
            minimum_size: Vec3::ONE,
            maximum_size: Vec3::ONE,
            minimum_vertex_position_set: 0.0,
            maximum_vertex_position_set: 1.0,
            target_position: ControllerTarget::default(),
            target_orientation: ControllerTarget::default(),
            target_size: ControllerTarget::default(),
            target_vertex_position_set: ControllerTarget::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StateManipulatorRule {
    pub(super) common: RuleCommon,
    def: StateManipulatorRuleDef,
}

impl StateManipulatorRule {
    pub(super) fn new(def: &StateManipulatorRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
        }
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let def = &self.def;
        let mode = self.common.blend_mode();
        let mask = def.channels.mask();

        if mask.any() {
            let position = ctx.target_value(&def.target_position, 0.0);
            let orientation = ctx.target_value(&def.target_orientation, 0.0);
            let size = ctx.target_value(&def.target_size, 0.0);
            let pose = Pose::new(
                def.minimum_position.lerp(def.maximum_position, position),
                quat_from_euler(lerp_euler(
                    def.minimum_rotation,
                    def.maximum_rotation,
                    orientation,
                )),
                def.minimum_size.lerp(def.maximum_size, size),
            );
            for &bone in self.common.bones() {
                bones.blend_pose(bone, &pose, mode, factor, mask);
            }
        }

        if def.channels.enable_vertex_position_set {
            let t = ctx.target_value(&def.target_vertex_position_set, 0.0);
            let weight = def.minimum_vertex_position_set
                + (def.maximum_vertex_position_set - def.minimum_vertex_position_set) * t;
            for &v in self.common.vps() {
                vps.blend_weight(v, weight, mode, factor);
            }
        }
    }
}
