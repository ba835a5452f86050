use serde::{Deserialize, Serialize};

use super::animation::SampledFrame;
use super::{
    BuildContext, ChannelFlags, ParamContext, Rule, RuleCommon, RuleCommonDef, RuleContext,
    RuleDef,
};
use crate::blend::{BlendMode, ChannelMask};
use crate::error::Result;
use crate::link::ControllerTarget;
use crate::math::EPSILON;
use crate::state::{BoneStateList, VpsStateList};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupApplication {
    /// Run every child in order.
    #[default]
    All,
    /// Run the child picked by the selection target, cross-fading into the next one.
    Selection,
}

/// Runs child rules on a private copy of the state and blends the result back.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub rules: Vec<RuleDef>,
    /// Seed the private copy with the current state instead of the rest pose.
    pub use_current_state: bool,
    pub application_type: GroupApplication,
    pub target_selection: ControllerTarget,
}

#[derive(Debug)]
pub struct GroupRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    use_current_state: bool,
    application: GroupApplication,
    target_selection: ControllerTarget,
    rules: Vec<Rule>,
    bones: BoneStateList,
    vps: VpsStateList,
    /// Second copy for the selection cross-fade.
    next_bones: BoneStateList,
    next_vps: VpsStateList,
}

impl GroupRule {
    pub(super) fn new(def: &GroupRuleDef, ctx: &BuildContext<'_>) -> Result<Self> {
        let mut rules = Vec::new();
        rules.try_reserve_exact(def.rules.len())?;
        for child in &def.rules {
            if let Some(rule) = Rule::build(child, ctx)? {
                rules.push(rule);
            }
        }
        Ok(Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            use_current_state: def.use_current_state,
            application: def.application_type,
            target_selection: def.target_selection.clone(),
            rules,
            bones: BoneStateList::new(),
            vps: VpsStateList::new(),
            next_bones: BoneStateList::new(),
            next_vps: VpsStateList::new(),
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Child index and cross-fade weight toward the next child for a selection value.
    pub fn selection(value: f32, count: usize) -> Option<(usize, f32)> {
        if count == 0 {
            return None;
        }
        let scaled = value.clamp(0.0, 1.0) * (count - 1) as f32;
        let index = (scaled.floor() as usize).min(count - 1);
        Some((index, scaled - index as f32))
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) -> Result<()> {
        self.bones = params.bones.clone();
        self.vps = params.vps.clone();
        if self.application == GroupApplication::Selection {
            self.next_bones = params.bones.clone();
            self.next_vps = params.vps.clone();
        }
        for rule in &mut self.rules {
            rule.update_parameters(params)?;
        }
        Ok(())
    }

    pub(super) fn needs_rebuild(&self) -> bool {
        self.rules.iter().any(Rule::needs_rebuild)
    }

    fn seed(
        use_current_state: bool,
        private_bones: &mut BoneStateList,
        private_vps: &mut VpsStateList,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) {
        private_bones.copy_poses_from(bones);
        private_vps.copy_weights_from(vps);
        if !use_current_state {
            private_bones.reset_poses();
            private_vps.reset_weights();
        }
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let in_sync = self.bones.len() == bones.len() && self.vps.len() == vps.len();
        if self.rules.is_empty() || !in_sync {
            return;
        }
        Self::seed(self.use_current_state, &mut self.bones, &mut self.vps, bones, vps);

        match self.application {
            GroupApplication::All => {
                for rule in &mut self.rules {
                    rule.apply(&mut self.bones, &mut self.vps, ctx);
                }
            }
            GroupApplication::Selection => {
                let value = ctx.target_value(&self.target_selection, 0.0);
                let Some((index, fade)) = Self::selection(value, self.rules.len()) else {
                    return;
                };
                self.rules[index].apply(&mut self.bones, &mut self.vps, ctx);
                if fade > EPSILON && index + 1 < self.rules.len() {
                    Self::seed(
                        self.use_current_state,
                        &mut self.next_bones,
                        &mut self.next_vps,
                        bones,
                        vps,
                    );
                    self.rules[index + 1].apply(&mut self.next_bones, &mut self.next_vps, ctx);
                    for b in 0..self.bones.len() {
                        let pose = self.next_bones.pose(b);
                        self.bones
                            .blend_pose(b, &pose, BlendMode::Blend, fade, ChannelMask::ALL);
                    }
                    for v in 0..self.vps.len() {
                        let weight = self.next_vps.weight(v);
                        self.vps.blend_weight(v, weight, BlendMode::Blend, fade);
                    }
                }
            }
        }

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
        for rule in &mut self.rules {
            rule.capture_state(id, bones, vps);
        }
    }

    pub(super) fn store_frame(
        &mut self,
        id: u32,
        frame: &SampledFrame,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) -> usize {
        self.rules
            .iter_mut()
            .map(|rule| rule.store_frame(id, frame, bones, vps))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_cross_fades_between_neighbours() {
        assert_eq!(GroupRule::selection(0.5, 2), Some((0, 0.5)));
        assert_eq!(GroupRule::selection(1.0, 3), Some((2, 0.0)));
        assert_eq!(GroupRule::selection(0.25, 1), Some((0, 0.0)));
        assert_eq!(GroupRule::selection(0.25, 0), None);
    }
}
