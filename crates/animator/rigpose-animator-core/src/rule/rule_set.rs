use std::sync::Arc;

use glam::Mat4;

use super::{BuildContext, ParamContext, Rule, RuleContext, SampledFrame};
use crate::animation::AnimationTracks;
use crate::config::Config;
use crate::controller::ControllerStates;
use crate::descriptor::AnimatorDef;
use crate::error::Result;
use crate::link::Link;
use crate::state::{BoneStateList, VpsStateList};

/// Links and rules built from one animator revision.
#[derive(Debug)]
pub struct RuleSet {
    def: Arc<AnimatorDef>,
    revision: u64,
    animation: Option<Arc<AnimationTracks>>,
    links: Vec<Link>,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// `controller_map` translates the definition's controller indices into indices of the
    /// [`ControllerStates`] passed to [`RuleSet::apply`].
    pub fn build(
        def: Arc<AnimatorDef>,
        revision: u64,
        animation: Option<Arc<AnimationTracks>>,
        controller_map: &[Option<usize>],
    ) -> Result<Self> {
        Self::build_nested(def, revision, animation, controller_map, 0)
    }

    pub(crate) fn build_nested(
        def: Arc<AnimatorDef>,
        revision: u64,
        animation: Option<Arc<AnimationTracks>>,
        controller_map: &[Option<usize>],
        depth: usize,
    ) -> Result<Self> {
        let mut links = Vec::new();
        links.try_reserve_exact(def.links.len())?;
        links.extend(def.links.iter().map(|l| Link::new(l, controller_map)));

        let ctx = BuildContext {
            controller_map,
            controllers: &def.controllers,
            animation: animation.as_ref(),
            depth,
        };
        let mut rules = Vec::new();
        rules.try_reserve_exact(def.rules.len())?;
        for rule_def in &def.rules {
            if let Some(rule) = Rule::build(rule_def, &ctx)? {
                rules.push(rule);
            }
        }
        log::debug!(
            "built animator '{}' revision {revision}: {} links, {} rules",
            def.name,
            links.len(),
            rules.len()
        );

        Ok(Self {
            def,
            revision,
            animation,
            links,
            rules,
        })
    }

    pub fn definition(&self) -> &Arc<AnimatorDef> {
        &self.def
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn animation(&self) -> Option<&Arc<AnimationTracks>> {
        self.animation.as_ref()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Resolve every name against rebuilt state lists.
    pub fn update_parameters(&mut self, bones: &BoneStateList, vps: &VpsStateList) -> Result<()> {
        for link in &mut self.links {
            link.resolve_bone(bones);
        }
        let params = ParamContext {
            bones,
            vps,
            animation: self.animation.as_deref(),
        };
        for rule in &mut self.rules {
            rule.update_parameters(&params)?;
        }
        Ok(())
    }

    /// Some nested animator changed since it was built.
    pub fn needs_rebuild(&self) -> bool {
        self.rules.iter().any(Rule::needs_rebuild)
    }

    /// Run every enabled rule in order.
    pub fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        controllers: &ControllerStates,
        config: &Config,
        component_matrix: Mat4,
    ) {
        for link in &mut self.links {
            link.update_bone_value(bones);
        }
        let ctx = RuleContext {
            links: &self.links,
            controllers,
            animation: self.animation.as_deref(),
            config,
            component_matrix,
        };
        for rule in &mut self.rules {
            rule.apply(bones, vps, &ctx);
        }
    }

    pub fn capture_state(&mut self, id: u32, bones: &BoneStateList, vps: &VpsStateList) {
        for rule in &mut self.rules {
            rule.capture_state(id, bones, vps);
        }
    }

    /// Sample `move_name` at `time` into every snapshot rule with `id`. Returns how many rules
    /// received the frame.
    pub fn store_frame(
        &mut self,
        id: u32,
        move_name: &str,
        time: f32,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) -> Result<usize> {
        let frame = SampledFrame::sample(self.animation.as_deref(), move_name, time, bones, vps)?;
        Ok(self
            .rules
            .iter_mut()
            .map(|rule| rule.store_frame(id, &frame, bones, vps))
            .sum())
    }
}
