//! Rules: the closed set of pose operations an animator runs in authored order.
//!
//! Descriptors ([`RuleDef`]) are plain serde data. [`Rule::build`] turns one into its runtime
//! form with a single `match`; unknown descriptor types contribute nothing. Every rule blends its
//! output into the bone graph through [`crate::blend`].

mod animation;
mod animation_difference;
mod animation_select;
mod bone_transformator;
mod foreign_state;
mod group;
mod inverse_kinematic;
mod limit;
mod mirror;
mod rule_set;
mod state_manipulator;
mod state_snapshot;
mod sub_animator;
mod track_to;

use std::sync::Arc;

use glam::Mat4;
use serde::{Deserialize, Serialize};

pub use animation::{AnimationRule, AnimationRuleDef};
pub use animation_difference::{AnimationDifferenceRule, AnimationDifferenceRuleDef};
pub use animation_select::{AnimationSelectRule, AnimationSelectRuleDef};
pub use bone_transformator::{
    BoneTransformatorRule, BoneTransformatorRuleDef, CoordinateFrame, InputSource,
};
pub use foreign_state::{ForeignFrame, ForeignStateRule, ForeignStateRuleDef};
pub use group::{GroupApplication, GroupRule, GroupRuleDef};
pub use inverse_kinematic::{InverseKinematicRule, InverseKinematicRuleDef};
pub use limit::{LimitRange, LimitRule, LimitRuleDef};
pub use mirror::{MatchName, MatchNameKind, MirrorAxis, MirrorRule, MirrorRuleDef};
pub use rule_set::RuleSet;
pub use state_manipulator::{StateManipulatorRule, StateManipulatorRuleDef};
pub use state_snapshot::{StateSnapshotRule, StateSnapshotRuleDef};
pub use sub_animator::{SubAnimatorRule, SubAnimatorRuleDef};
pub use track_to::{LockedAxis, TrackAxis, TrackToRule, TrackToRuleDef, UpTarget};

use crate::animation::AnimationTracks;
use crate::blend::{BlendMode, ChannelMask, Pose};
use crate::config::Config;
use crate::controller::{Controller, ControllerStates};
use crate::error::Result;
use crate::link::{ControllerTarget, Link};
use crate::math::is_zero;
use crate::state::{BoneStateList, VpsStateList};

/// Fields shared by every rule descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleCommonDef {
    pub name: String,
    pub enabled: bool,
    pub blend_mode: BlendMode,
    pub blend_factor: f32,
    pub invert_blend_factor: bool,
    /// Multiplies `blend_factor`.
    pub target_blend_factor: ControllerTarget,
    /// Bones the rule affects; empty means all.
    pub bones: Vec<String>,
    /// Vertex position sets the rule affects; empty means all.
    pub vertex_position_sets: Vec<String>,
}

impl Default for RuleCommonDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            blend_mode: BlendMode::Blend,
            blend_factor: 1.0,
            invert_blend_factor: false,
            target_blend_factor: ControllerTarget::default(),
            bones: Vec::new(),
            vertex_position_sets: Vec::new(),
        }
    }
}

/// Which outputs a rule writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelFlags {
    pub enable_position: bool,
    pub enable_orientation: bool,
    pub enable_size: bool,
    pub enable_vertex_position_set: bool,
}

impl Default for ChannelFlags {
    fn default() -> Self {
        Self {
            enable_position: true,
            enable_orientation: true,
            enable_size: true,
            enable_vertex_position_set: true,
        }
    }
}

impl ChannelFlags {
    pub fn mask(&self) -> ChannelMask {
        ChannelMask::new(
            self.enable_position,
            self.enable_orientation,
            self.enable_size,
        )
    }

    pub fn all(&self) -> bool {
        self.mask().is_all() && self.enable_vertex_position_set
    }
}

/// Serialized rule, tagged by `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleDef {
    Animation(AnimationRuleDef),
    AnimationDifference(AnimationDifferenceRuleDef),
    AnimationSelect(AnimationSelectRuleDef),
    BoneTransformator(BoneTransformatorRuleDef),
    InverseKinematic(InverseKinematicRuleDef),
    Limit(LimitRuleDef),
    Mirror(MirrorRuleDef),
    StateManipulator(StateManipulatorRuleDef),
    StateSnapshot(StateSnapshotRuleDef),
    ForeignState(ForeignStateRuleDef),
    Group(GroupRuleDef),
    SubAnimator(SubAnimatorRuleDef),
    TrackTo(TrackToRuleDef),
    /// Any `type` this build does not know.
    #[serde(other)]
    Unknown,
}

impl RuleDef {
    pub fn common(&self) -> Option<&RuleCommonDef> {
        Some(match self {
            RuleDef::Animation(d) => &d.common,
            RuleDef::AnimationDifference(d) => &d.common,
            RuleDef::AnimationSelect(d) => &d.common,
            RuleDef::BoneTransformator(d) => &d.common,
            RuleDef::InverseKinematic(d) => &d.common,
            RuleDef::Limit(d) => &d.common,
            RuleDef::Mirror(d) => &d.common,
            RuleDef::StateManipulator(d) => &d.common,
            RuleDef::StateSnapshot(d) => &d.common,
            RuleDef::ForeignState(d) => &d.common,
            RuleDef::Group(d) => &d.common,
            RuleDef::SubAnimator(d) => &d.common,
            RuleDef::TrackTo(d) => &d.common,
            RuleDef::Unknown => return None,
        })
    }
}

/// Runtime part of [`RuleCommonDef`] with names resolved against the state lists.
#[derive(Clone, Debug)]
pub struct RuleCommon {
    name: String,
    enabled: bool,
    blend_mode: BlendMode,
    blend_factor: f32,
    invert_blend_factor: bool,
    target_blend_factor: ControllerTarget,
    bone_names: Vec<String>,
    vps_names: Vec<String>,
    bones: Vec<usize>,
    vps: Vec<usize>,
}

impl RuleCommon {
    fn new(def: &RuleCommonDef) -> Self {
        Self {
            name: def.name.clone(),
            enabled: def.enabled,
            blend_mode: def.blend_mode,
            blend_factor: def.blend_factor,
            invert_blend_factor: def.invert_blend_factor,
            target_blend_factor: def.target_blend_factor.clone(),
            bone_names: def.bones.clone(),
            vps_names: def.vertex_position_sets.clone(),
            bones: Vec::new(),
            vps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Mapped bone state indices, in authored order.
    pub fn bones(&self) -> &[usize] {
        &self.bones
    }

    pub fn vps(&self) -> &[usize] {
        &self.vps
    }

    pub fn bone_names(&self) -> &[String] {
        &self.bone_names
    }

    /// No bone or VPS restriction authored.
    pub fn is_unrestricted(&self) -> bool {
        self.bone_names.is_empty() && self.vps_names.is_empty()
    }

    fn update_mappings(&mut self, bones: &BoneStateList, vps: &VpsStateList) {
        self.bones = if self.bone_names.is_empty() {
            (0..bones.len()).collect()
        } else {
            self.bone_names
                .iter()
                .filter_map(|n| bones.index_of(n))
                .collect()
        };
        self.vps = if self.vps_names.is_empty() {
            (0..vps.len()).collect()
        } else {
            self.vps_names
                .iter()
                .filter_map(|n| vps.index_of(n))
                .collect()
        };
    }

    /// Static factor times the controller target, optionally inverted.
    pub fn blend_factor(&self, ctx: &RuleContext<'_>) -> f32 {
        let factor = self.blend_factor
            * self
                .target_blend_factor
                .value(ctx.links, ctx.controllers, 1.0);
        if self.invert_blend_factor {
            1.0 - factor
        } else {
            factor
        }
    }
}

/// Inputs a rule reads while it runs.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub links: &'a [Link],
    pub controllers: &'a ControllerStates,
    pub animation: Option<&'a AnimationTracks>,
    pub config: &'a Config,
    /// World matrix of the component.
    pub component_matrix: Mat4,
}

impl<'a> RuleContext<'a> {
    pub fn target_value(&self, target: &ControllerTarget, default: f32) -> f32 {
        target.value(self.links, self.controllers, default)
    }

    pub fn target_vector(&self, target: &ControllerTarget, default: glam::Vec3) -> glam::Vec3 {
        target.vector(self.links, self.controllers, default)
    }

    pub fn target_quaternion(&self, target: &ControllerTarget, default: glam::Quat) -> glam::Quat {
        target.quaternion(self.links, self.controllers, default)
    }
}

/// Inputs for building rules from descriptors.
#[derive(Clone, Copy)]
pub(crate) struct BuildContext<'a> {
    /// Descriptor controller index to evaluated controller state index.
    pub controller_map: &'a [Option<usize>],
    /// Controllers of the animator owning the rules, for name based matching.
    pub controllers: &'a [Controller],
    /// Animation of the owning animator; nested animators without one inherit it.
    pub animation: Option<&'a Arc<AnimationTracks>>,
    /// Sub-animator nesting level.
    pub depth: usize,
}

/// Inputs for refreshing rule parameters after mappings changed.
#[derive(Clone, Copy)]
pub(crate) struct ParamContext<'a> {
    pub bones: &'a BoneStateList,
    pub vps: &'a VpsStateList,
    pub animation: Option<&'a AnimationTracks>,
}

#[derive(Debug)]
pub enum Rule {
    Animation(AnimationRule),
    AnimationDifference(AnimationDifferenceRule),
    AnimationSelect(AnimationSelectRule),
    BoneTransformator(BoneTransformatorRule),
    InverseKinematic(InverseKinematicRule),
    Limit(LimitRule),
    Mirror(MirrorRule),
    StateManipulator(StateManipulatorRule),
    StateSnapshot(StateSnapshotRule),
    ForeignState(ForeignStateRule),
    Group(GroupRule),
    SubAnimator(SubAnimatorRule),
    TrackTo(TrackToRule),
}

impl Rule {
    /// Runtime rule for a descriptor; `None` for unknown descriptor types.
    pub(crate) fn build(def: &RuleDef, ctx: &BuildContext<'_>) -> Result<Option<Rule>> {
        let rule = match def {
            RuleDef::Animation(d) => Rule::Animation(AnimationRule::new(d)),
            RuleDef::AnimationDifference(d) => {
                Rule::AnimationDifference(AnimationDifferenceRule::new(d))
            }
            RuleDef::AnimationSelect(d) => Rule::AnimationSelect(AnimationSelectRule::new(d)),
            RuleDef::BoneTransformator(d) => {
                Rule::BoneTransformator(BoneTransformatorRule::new(d))
            }
            RuleDef::InverseKinematic(d) => Rule::InverseKinematic(InverseKinematicRule::new(d)),
            RuleDef::Limit(d) => Rule::Limit(LimitRule::new(d)),
            RuleDef::Mirror(d) => Rule::Mirror(MirrorRule::new(d)),
            RuleDef::StateManipulator(d) => Rule::StateManipulator(StateManipulatorRule::new(d)),
            RuleDef::StateSnapshot(d) => Rule::StateSnapshot(StateSnapshotRule::new(d)),
            RuleDef::ForeignState(d) => Rule::ForeignState(ForeignStateRule::new(d)),
            RuleDef::Group(d) => Rule::Group(GroupRule::new(d, ctx)?),
            RuleDef::SubAnimator(d) => Rule::SubAnimator(SubAnimatorRule::new(d, ctx)?),
            RuleDef::TrackTo(d) => Rule::TrackTo(TrackToRule::new(d)),
            RuleDef::Unknown => {
                log::debug!("skipping rule descriptor of unknown type");
                return Ok(None);
            }
        };
        Ok(Some(rule))
    }

    pub fn common(&self) -> &RuleCommon {
        match self {
            Rule::Animation(r) => &r.common,
            Rule::AnimationDifference(r) => &r.common,
            Rule::AnimationSelect(r) => &r.common,
            Rule::BoneTransformator(r) => &r.common,
            Rule::InverseKinematic(r) => &r.common,
            Rule::Limit(r) => &r.common,
            Rule::Mirror(r) => &r.common,
            Rule::StateManipulator(r) => &r.common,
            Rule::StateSnapshot(r) => &r.common,
            Rule::ForeignState(r) => &r.common,
            Rule::Group(r) => &r.common,
            Rule::SubAnimator(r) => &r.common,
            Rule::TrackTo(r) => &r.common,
        }
    }

    fn common_mut(&mut self) -> &mut RuleCommon {
        match self {
            Rule::Animation(r) => &mut r.common,
            Rule::AnimationDifference(r) => &mut r.common,
            Rule::AnimationSelect(r) => &mut r.common,
            Rule::BoneTransformator(r) => &mut r.common,
            Rule::InverseKinematic(r) => &mut r.common,
            Rule::Limit(r) => &mut r.common,
            Rule::Mirror(r) => &mut r.common,
            Rule::StateManipulator(r) => &mut r.common,
            Rule::StateSnapshot(r) => &mut r.common,
            Rule::ForeignState(r) => &mut r.common,
            Rule::Group(r) => &mut r.common,
            Rule::SubAnimator(r) => &mut r.common,
            Rule::TrackTo(r) => &mut r.common,
        }
    }

    /// Re-resolve names, moves and chains against rebuilt state lists.
    pub(crate) fn update_parameters(&mut self, params: &ParamContext<'_>) -> Result<()> {
        self.common_mut().update_mappings(params.bones, params.vps);
        match self {
            Rule::Animation(r) => r.update_parameters(params),
            Rule::AnimationDifference(r) => r.update_parameters(params),
            Rule::AnimationSelect(r) => r.update_parameters(params),
            Rule::BoneTransformator(r) => r.update_parameters(params),
            Rule::InverseKinematic(r) => r.update_parameters(params)?,
            Rule::Limit(r) => r.update_parameters(params),
            Rule::Mirror(r) => r.update_parameters(params),
            Rule::StateManipulator(_) => {}
            Rule::StateSnapshot(r) => r.update_parameters(params),
            Rule::ForeignState(r) => r.update_parameters(params),
            Rule::Group(r) => r.update_parameters(params)?,
            Rule::SubAnimator(r) => r.update_parameters(params)?,
            Rule::TrackTo(r) => r.update_parameters(params),
        }
        Ok(())
    }

    /// A nested animator changed since this rule was built.
    pub fn needs_rebuild(&self) -> bool {
        match self {
            Rule::Group(r) => r.needs_rebuild(),
            Rule::SubAnimator(r) => r.needs_rebuild(),
            _ => false,
        }
    }

    pub(crate) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
    ) {
        if !self.common().enabled {
            return;
        }
        let factor = self.common().blend_factor(ctx);
        if is_zero(factor) {
            return;
        }
        match self {
            Rule::Animation(r) => r.apply(bones, vps, ctx, factor),
            Rule::AnimationDifference(r) => r.apply(bones, vps, ctx, factor),
            Rule::AnimationSelect(r) => r.apply(bones, vps, ctx, factor),
            Rule::BoneTransformator(r) => r.apply(bones, ctx, factor),
            Rule::InverseKinematic(r) => r.apply(bones, ctx, factor),
            Rule::Limit(r) => r.apply(bones, vps, factor),
            Rule::Mirror(r) => r.apply(bones, factor),
            Rule::StateManipulator(r) => r.apply(bones, vps, ctx, factor),
            Rule::StateSnapshot(r) => r.apply(bones, vps, factor),
            Rule::ForeignState(r) => r.apply(bones, vps, ctx, factor),
            Rule::Group(r) => r.apply(bones, vps, ctx, factor),
            Rule::SubAnimator(r) => r.apply(bones, vps, ctx, factor),
            Rule::TrackTo(r) => r.apply(bones, ctx, factor),
        }
    }

    /// Store the current state in every snapshot rule with `id`, recursing into nested rules.
    pub(crate) fn capture_state(&mut self, id: u32, bones: &BoneStateList, vps: &VpsStateList) {
        match self {
            Rule::StateSnapshot(r) if r.id() == id => r.capture(bones, vps),
            Rule::Group(r) => r.capture_state(id, bones, vps),
            Rule::SubAnimator(r) => r.capture_state(id, bones, vps),
            _ => {}
        }
    }

    /// Store an animation frame in every snapshot rule with `id`. Returns how many rules stored.
    pub(crate) fn store_frame(
        &mut self,
        id: u32,
        frame: &animation::SampledFrame,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) -> usize {
        match self {
            Rule::StateSnapshot(r) if r.id() == id => {
                r.store(frame, bones, vps);
                1
            }
            Rule::Group(r) => r.store_frame(id, frame, bones, vps),
            _ => 0,
        }
    }
}

/// Blend a new bone-local matrix into `bone`.
pub(crate) fn blend_local_matrix(
    bones: &mut BoneStateList,
    bone: usize,
    local: &Mat4,
    mode: BlendMode,
    factor: f32,
    mask: ChannelMask,
) {
    bones.blend_toward(bone, &Pose::from_matrix(local), mode, factor, mask);
}

pub(crate) use animation::SampledFrame;
