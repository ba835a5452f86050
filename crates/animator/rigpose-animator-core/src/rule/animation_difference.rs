use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::animation::MoveBinding;
use super::{ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::blend::{BlendMode, Pose};
use crate::link::ControllerTarget;
use crate::state::{BoneStateList, VpsStateList};

/// Adds the difference between a leading and a reference frame onto the current state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationDifferenceRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub leading_move_name: String,
    pub leading_move_time: f32,
    pub reference_move_name: String,
    pub reference_move_time: f32,
    pub target_leading_move_time: ControllerTarget,
    pub target_reference_move_time: ControllerTarget,
}

#[derive(Clone, Debug)]
pub struct AnimationDifferenceRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    leading_move_name: String,
    leading_move_time: f32,
    reference_move_name: String,
    reference_move_time: f32,
    target_leading_move_time: ControllerTarget,
    target_reference_move_time: ControllerTarget,
    leading: Option<MoveBinding>,
    reference: Option<MoveBinding>,
}

impl AnimationDifferenceRule {
    pub(super) fn new(def: &AnimationDifferenceRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            leading_move_name: def.leading_move_name.clone(),
            leading_move_time: def.leading_move_time,
            reference_move_name: def.reference_move_name.clone(),
            reference_move_time: def.reference_move_time,
            target_leading_move_time: def.target_leading_move_time.clone(),
            target_reference_move_time: def.target_reference_move_time.clone(),
            leading: None,
            reference: None,
        }
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        let resolve = |name: &str| {
            MoveBinding::resolve(params.animation, name, &self.common, params.bones, params.vps)
        };
        self.leading = resolve(&self.leading_move_name);
        self.reference = resolve(&self.reference_move_name);
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let (Some(leading), Some(reference), Some(animation)) =
            (&self.leading, &self.reference, ctx.animation)
        else {
            return;
        };
        let (Some(lead_move), Some(ref_move)) =
            (leading.move_in(animation), reference.move_in(animation))
        else {
            return;
        };
        let lead_time = lead_move.time_at(
            ctx.target_value(&self.target_leading_move_time, self.leading_move_time),
        );
        let ref_time = ref_move.time_at(
            ctx.target_value(&self.target_reference_move_time, self.reference_move_time),
        );
        let mode = self.common.blend_mode();
        let mask = self.channels.mask();

        if mask.any() {
            for (k, &bone) in self.common.bones().iter().enumerate() {
                let (Some(lead), Some(refr)) = (
                    leading.bone_pose(lead_move, k, lead_time),
                    reference.bone_pose(ref_move, k, ref_time),
                ) else {
                    continue;
                };
                let delta = Pose::new(
                    lead.position - refr.position,
                    (lead.orientation * refr.orientation.conjugate()).normalize(),
                    lead.scale - refr.scale,
                );
                let incoming = match mode {
                    BlendMode::Blend => {
                        let current = bones.pose(bone);
                        Pose::new(
                            current.position + delta.position,
                            (delta.orientation * current.orientation).normalize(),
                            current.scale + delta.scale,
                        )
                    }
                    BlendMode::Overlay => {
                        Pose::new(delta.position, delta.orientation, Vec3::ONE + delta.scale)
                    }
                };
                bones.blend_pose(bone, &incoming, mode, factor, mask);
            }
        }

        if self.channels.enable_vertex_position_set {
            for (k, &v) in self.common.vps().iter().enumerate() {
                let (Some(lead), Some(refr)) = (
                    leading.vps_weight(lead_move, k, lead_time),
                    reference.vps_weight(ref_move, k, ref_time),
                ) else {
                    continue;
                };
                let delta = lead - refr;
                let incoming = match mode {
                    BlendMode::Blend => vps.weight(v) + delta,
                    BlendMode::Overlay => delta,
                };
                vps.blend_weight(v, incoming, mode, factor);
            }
        }
    }
}
