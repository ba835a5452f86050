use serde::{Deserialize, Serialize};

use super::animation::MoveBinding;
use super::{ChannelFlags, ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::link::ControllerTarget;
use crate::state::{BoneStateList, VpsStateList};

/// Plays one move out of a list, picked by a controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationSelectRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub moves: Vec<String>,
    pub target_move_time: ControllerTarget,
    pub target_selection: ControllerTarget,
}

#[derive(Clone, Debug)]
pub struct AnimationSelectRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    moves: Vec<String>,
    target_move_time: ControllerTarget,
    target_selection: ControllerTarget,
    bindings: Vec<Option<MoveBinding>>,
}

impl AnimationSelectRule {
    pub(super) fn new(def: &AnimationSelectRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            moves: def.moves.clone(),
            target_move_time: def.target_move_time.clone(),
            target_selection: def.target_selection.clone(),
            bindings: Vec::new(),
        }
    }

    /// Index picked for a selection value: `floor(selection * count)` clamped into the list.
    pub fn selected_index(selection: f32, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let index = (selection.clamp(0.0, 1.0) * count as f32).floor() as usize;
        Some(index.min(count - 1))
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.bindings = self
            .moves
            .iter()
            .map(|name| {
                MoveBinding::resolve(
                    params.animation,
                    name,
                    &self.common,
                    params.bones,
                    params.vps,
                )
            })
            .collect();
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let Some(animation) = ctx.animation else {
            return;
        };
        let selection = ctx.target_value(&self.target_selection, 0.0);
        let Some(index) = Self::selected_index(selection, self.bindings.len()) else {
            return;
        };
        let Some(binding) = &self.bindings[index] else {
            return;
        };
        let Some(mv) = binding.move_in(animation) else {
            return;
        };
        let time = mv.time_at(ctx.target_value(&self.target_move_time, 0.0));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_snaps_to_buckets() {
        assert_eq!(AnimationSelectRule::selected_index(0.0, 3), Some(0));
        assert_eq!(AnimationSelectRule::selected_index(0.34, 3), Some(1));
        assert_eq!(AnimationSelectRule::selected_index(1.0, 3), Some(2));
        assert_eq!(AnimationSelectRule::selected_index(0.5, 0), None);
    }
}
