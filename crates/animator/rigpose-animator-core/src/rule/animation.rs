use serde::{Deserialize, Serialize};

use super::{ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::animation::{AnimationTracks, MoveTracks};
use crate::blend::Pose;
use crate::error::{AnimatorError, Result};
use crate::link::ControllerTarget;
use crate::state::{BoneStateList, VpsStateList};

/// Play one move at a controller driven time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub move_name: String,
    /// Normalized time used when `target_move_time` is unbound.
    pub move_time: f32,
    pub target_move_time: ControllerTarget,
}

/// A move's track indices resolved for the rule's bone and VPS mappings.
#[derive(Clone, Debug, Default)]
pub(crate) struct MoveBinding {
    index: usize,
    /// Parallel to the rule's mapped bones.
    bone_tracks: Vec<Option<usize>>,
    /// Parallel to the rule's mapped VPS.
    vps_tracks: Vec<Option<usize>>,
}

impl MoveBinding {
    /// `None` when the animation lacks the move.
    pub(crate) fn resolve(
        animation: Option<&AnimationTracks>,
        name: &str,
        common: &RuleCommon,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) -> Option<Self> {
        let animation = animation?;
        let Some(index) = animation.move_index(name) else {
            log::debug!("rule '{}': move '{name}' not found", common.name());
            return None;
        };
        let mv = animation.move_at(index);
        Some(Self {
            index,
            bone_tracks: common
                .bones()
                .iter()
                .map(|&b| mv.bone_track_index(bones.name(b)))
                .collect(),
            vps_tracks: common
                .vps()
                .iter()
                .map(|&v| mv.vps_track_index(vps.state(v).name()))
                .collect(),
        })
    }

    pub(crate) fn move_in<'a>(&self, animation: &'a AnimationTracks) -> Option<&'a MoveTracks> {
        animation.moves().get(self.index)
    }

    /// Pose of the `k`-th mapped bone at `time`; `None` without a track.
    pub(crate) fn bone_pose(&self, mv: &MoveTracks, k: usize, time: f32) -> Option<Pose> {
        self.bone_tracks
            .get(k)
            .copied()
            .flatten()
            .map(|t| mv.bone_track(t).sample(time))
    }

    pub(crate) fn vps_weight(&self, mv: &MoveTracks, k: usize, time: f32) -> Option<f32> {
        self.vps_tracks
            .get(k)
            .copied()
            .flatten()
            .map(|t| mv.vps_track(t).sample(time))
    }

    /// Blend the move at `time` into the mapped bones and VPS. Bones without a track receive
    /// the rest pose.
    pub(crate) fn blend_into(
        &self,
        mv: &MoveTracks,
        time: f32,
        common: &RuleCommon,
        channels: &ChannelFlags,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        factor: f32,
    ) {
        let mask = channels.mask();
        if mask.any() {
            for (k, &bone) in common.bones().iter().enumerate() {
                let pose = self.bone_pose(mv, k, time).unwrap_or(Pose::IDENTITY);
                bones.blend_pose(bone, &pose, common.blend_mode(), factor, mask);
            }
        }
        if channels.enable_vertex_position_set {
            for (k, &v) in common.vps().iter().enumerate() {
                let weight = self.vps_weight(mv, k, time).unwrap_or(0.0);
                vps.blend_weight(v, weight, common.blend_mode(), factor);
            }
        }
    }
}

/// One move sampled for every state, used to fill snapshot rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct SampledFrame {
    pub bones: Vec<Option<Pose>>,
    pub vps: Vec<Option<f32>>,
}

impl SampledFrame {
    pub(crate) fn sample(
        animation: Option<&AnimationTracks>,
        move_name: &str,
        time: f32,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) -> Result<Self> {
        let mv = animation
            .and_then(|a| a.find_move(move_name))
            .ok_or_else(|| AnimatorError::UnknownMove(move_name.to_owned()))?;
        Ok(Self {
            bones: (0..bones.len())
                .map(|b| {
                    mv.bone_track_index(bones.name(b))
                        .map(|t| mv.bone_track(t).sample(time))
                })
                .collect(),
            vps: (0..vps.len())
                .map(|v| {
                    mv.vps_track_index(vps.state(v).name())
                        .map(|t| mv.vps_track(t).sample(time))
                })
                .collect(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct AnimationRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    move_name: String,
    move_time: f32,
    target_move_time: ControllerTarget,
    binding: Option<MoveBinding>,
}

impl AnimationRule {
    pub(super) fn new(def: &AnimationRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            move_name: def.move_name.clone(),
            move_time: def.move_time,
            target_move_time: def.target_move_time.clone(),
            binding: None,
        }
    }

    pub fn move_name(&self) -> &str {
        &self.move_name
    }

    /// The move was found in the current animation.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.binding = MoveBinding::resolve(
            params.animation,
            &self.move_name,
            &self.common,
            params.bones,
            params.vps,
        );
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let (Some(binding), Some(animation)) = (&self.binding, ctx.animation) else {
            return;
        };
        let Some(mv) = binding.move_in(animation) else {
            return;
        };
        let time = mv.time_at(ctx.target_value(&self.target_move_time, self.move_time));
        binding.blend_into(
            mv,
            time,
            &self.common,
            &self.channels,
            bones,
            vps,
            factor,
        );
    }
}
