use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    BuildContext, ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext, RuleSet,
};
use crate::blend::BlendMode;
use crate::descriptor::Animator;
use crate::error::Result;
use crate::math::is_one;
use crate::state::{BoneStateList, VpsStateList};

/// Deeper nesting is treated as a cycle and the sub-animator stays empty.
const MAX_NESTING: usize = 16;

/// Runs another animator's rules as one rule of this animator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubAnimatorRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    /// Resource name the host resolves into `animator`.
    pub path: String,
    #[serde(skip)]
    pub animator: Option<Arc<Animator>>,
    /// Parent controller driving each nested controller. Empty connects controllers by name.
    pub connections: Vec<Option<usize>>,
}

#[derive(Debug)]
pub struct SubAnimatorRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    animator: Option<Arc<Animator>>,
    rules: Option<RuleSet>,
    bones: BoneStateList,
    vps: VpsStateList,
}

impl SubAnimatorRule {
    pub(super) fn new(def: &SubAnimatorRuleDef, ctx: &BuildContext<'_>) -> Result<Self> {
        let rules = match &def.animator {
            Some(_) if ctx.depth >= MAX_NESTING => {
                log::warn!("sub-animator '{}' nested too deep, ignoring", def.path);
                None
            }
            Some(animator) => {
                let (nested, revision) = animator.snapshot();
                let controller_map: Vec<Option<usize>> = nested
                    .controllers
                    .iter()
                    .enumerate()
                    .map(|(i, controller)| {
                        let parent = if def.connections.is_empty() {
                            ctx.controllers.iter().position(|c| c.name == controller.name)
                        } else {
                            def.connections.get(i).copied().flatten()
                        };
                        parent.and_then(|p| ctx.controller_map.get(p).copied().flatten())
                    })
                    .collect();
                let animation = nested.animation.clone().or_else(|| ctx.animation.cloned());
                Some(RuleSet::build_nested(
                    nested,
                    revision,
                    animation,
                    &controller_map,
                    ctx.depth + 1,
                )?)
            }
            None => None,
        };
        Ok(Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            animator: def.animator.clone(),
            rules,
            bones: BoneStateList::new(),
            vps: VpsStateList::new(),
        })
    }

    pub fn rule_set(&self) -> Option<&RuleSet> {
        self.rules.as_ref()
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) -> Result<()> {
        if let Some(rules) = &mut self.rules {
            rules.update_parameters(params.bones, params.vps)?;
        }
        self.bones = params.bones.clone();
        self.vps = params.vps.clone();
        Ok(())
    }

    pub(super) fn needs_rebuild(&self) -> bool {
        match (&self.animator, &self.rules) {
            (Some(animator), Some(rules)) => {
                animator.revision() != rules.revision() || rules.needs_rebuild()
            }
            _ => false,
        }
    }

    /// The nested animator can write straight into the caller's state.
    fn is_direct(&self, factor: f32) -> bool {
        self.common.blend_mode() == BlendMode::Blend
            && is_one(factor)
            && self.common.is_unrestricted()
            && self.channels.all()
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let direct = self.is_direct(factor);
        let Some(rules) = &mut self.rules else {
            return;
        };
        if direct {
            rules.apply(bones, vps, ctx.controllers, ctx.config, ctx.component_matrix);
            return;
        }
        if self.bones.len() != bones.len() || self.vps.len() != vps.len() {
            return;
        }
        self.bones.copy_poses_from(bones);
        self.vps.copy_weights_from(vps);
        rules.apply(
            &mut self.bones,
            &mut self.vps,
            ctx.controllers,
            ctx.config,
            ctx.component_matrix,
        );

        let mode = self.common.blend_mode();
        let mask = self.channels.mask();
        if mask.any() {
            for &bone in self.common.bones() {
                bones.blend_pose(bone, &self.bones.pose(bone), mode, factor, mask);
            }
        }
        if self.channels.enable_vertex_position_set {
            for &v in self.common.vps() {
                vps.blend_weight(v, self.vps.weight(v), mode, factor);
            }
        }
    }

    pub(super) fn capture_state(&mut self, id: u32, bones: &BoneStateList, vps: &VpsStateList) {
        if let Some(rules) = &mut self.rules {
            rules.capture_state(id, bones, vps);
        }
    }
}
