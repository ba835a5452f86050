use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::blend::{slerp_shortest, Pose};
use crate::link::ControllerTarget;
use crate::math::{quat_from_euler, quat_to_euler};
use crate::state::{BoneStateList, VpsStateList};

/// Frame a foreign pose is read from or written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ForeignFrame {
    #[default]
    Local,
    Component,
}

/// Copies one bone's (or VPS's) state onto the rule's targets, scaled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForeignStateRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub foreign_bone: Option<String>,
    pub foreign_vertex_position_set: Option<String>,
    pub scale_position: f32,
    pub scale_orientation: f32,
    pub scale_size: f32,
    pub scale_vertex_position_set: f32,
    pub source_frame: ForeignFrame,
    pub destination_frame: ForeignFrame,
    pub modify_x: bool,
    pub modify_y: bool,
    pub modify_z: bool,
    pub target_position: ControllerTarget,
    pub target_orientation: ControllerTarget,
    pub target_size: ControllerTarget,
    pub target_vertex_position_set: ControllerTarget,
}

impl Default for ForeignStateRuleDef {
    fn default() -> Self {
        Self {
            common: RuleCommonDef::default(),
            channels: ChannelFlags::default(),
            foreign_bone: None,
            foreign_vertex_position_set: None,
            scale_position: 1.0,
            scale_orientation: 1.0,
            scale_size: 1.0,
            scale_vertex_position_set: 1.0,
            source_frame: ForeignFrame::Local,
            destination_frame: ForeignFrame::Local,
            modify_x: true,
            modify_y: true,
            modify_z: true,
            target_position: ControllerTarget::default(),
            target_orientation: ControllerTarget::default(),
            target_size: ControllerTarget::default(),
            target_vertex_position_set: ControllerTarget::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ForeignStateRule {
    pub(super) common: RuleCommon,
    def: ForeignStateRuleDef,
    foreign_bone: Option<usize>,
    foreign_vps: Option<usize>,
}

impl ForeignStateRule {
    pub(super) fn new(def: &ForeignStateRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
            foreign_bone: None,
            foreign_vps: None,
        }
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.foreign_bone = self
            .def
            .foreign_bone
            .as_deref()
            .and_then(|n| params.bones.index_of(n));
        self.foreign_vps = self
            .def
            .foreign_vertex_position_set
            .as_deref()
            .and_then(|n| params.vps.index_of(n));
    }

    /// Keep the axes that are not modified at their values in `current`.
    fn keep_unmodified(&self, value: Vec3, current: Vec3) -> Vec3 {
        Vec3::new(
            if self.def.modify_x { value.x } else { current.x },
            if self.def.modify_y { value.y } else { current.y },
            if self.def.modify_z { value.z } else { current.z },
        )
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

        if let (Some(foreign), true) = (self.foreign_bone, mask.any()) {
            let source = match def.source_frame {
                ForeignFrame::Local => bones.pose(foreign),
                ForeignFrame::Component => Pose::from_matrix(&bones.global_matrix(foreign)),
            };
            let scale_position =
                def.scale_position * ctx.target_value(&def.target_position, 1.0);
            let scale_orientation =
                def.scale_orientation * ctx.target_value(&def.target_orientation, 1.0);
            let scale_size = def.scale_size * ctx.target_value(&def.target_size, 1.0);
            let scaled = Pose::new(
                source.position * scale_position,
                slerp_shortest(Quat::IDENTITY, source.orientation, scale_orientation),
                Vec3::ONE + (source.scale - Vec3::ONE) * scale_size,
            );
            let all_axes = def.modify_x && def.modify_y && def.modify_z;

            for &bone in self.common.bones() {
                let mut pose = match def.destination_frame {
                    ForeignFrame::Local => scaled,
                    ForeignFrame::Component => {
                        bones.local_pose_from_global(bone, &scaled.matrix())
                    }
                };
                if !all_axes {
                    let current = bones.pose(bone);
                    pose.position = self.keep_unmodified(pose.position, current.position);
                    pose.scale = self.keep_unmodified(pose.scale, current.scale);
                    pose.orientation = quat_from_euler(self.keep_unmodified(
                        quat_to_euler(pose.orientation),
                        quat_to_euler(current.orientation),
                    ));
                }
                bones.blend_pose(bone, &pose, mode, factor, mask);
            }
        }

        if let (Some(foreign), true) = (self.foreign_vps, def.channels.enable_vertex_position_set)
        {
            let weight = vps.weight(foreign)
                * def.scale_vertex_position_set
                * ctx.target_value(&def.target_vertex_position_set, 1.0);
            for &v in self.common.vps() {
                vps.blend_weight(v, weight, mode, factor);
            }
        }
    }
}
