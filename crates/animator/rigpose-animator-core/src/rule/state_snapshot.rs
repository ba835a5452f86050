use serde::{Deserialize, Serialize};

use super::animation::SampledFrame;
use super::{ChannelFlags, ParamContext, RuleCommon, RuleCommonDef};
use crate::blend::Pose;
use crate::state::{BoneStateList, VpsStateList};

/// Replays a stored state: either the previous frame's output or an explicit snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateSnapshotRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    /// Use the pose the component had before this pass instead of a stored snapshot.
    pub use_last_state: bool,
    /// Identifies the rule for capture and store-frame requests.
    pub id: u32,
}

#[derive(Clone, Debug)]
pub struct StateSnapshotRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    use_last_state: bool,
    id: u32,
    /// Indexed by bone state; empty until something was stored.
    bones: Vec<Pose>,
    vps: Vec<f32>,
}

impl StateSnapshotRule {
    pub(super) fn new(def: &StateSnapshotRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            use_last_state: def.use_last_state,
            id: def.id,
            bones: Vec::new(),
            vps: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn has_snapshot(&self) -> bool {
        !self.bones.is_empty() || !self.vps.is_empty()
    }

    /// Stored pose of bone state `index`.
    pub fn stored_pose(&self, index: usize) -> Option<Pose> {
        self.bones.get(index).copied()
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        // stored data is indexed by state; a different topology invalidates it
        if self.bones.len() != params.bones.len() {
            self.bones.clear();
        }
        if self.vps.len() != params.vps.len() {
            self.vps.clear();
        }
    }

    pub(super) fn capture(&mut self, bones: &BoneStateList, vps: &VpsStateList) {
        self.bones = (0..bones.len()).map(|b| bones.pose(b)).collect();
        self.vps = (0..vps.len()).map(|v| vps.weight(v)).collect();
    }

    /// Store a sampled frame; states without a track keep the rest pose and zero weight.
    pub(super) fn store(
        &mut self,
        frame: &SampledFrame,
        bones: &BoneStateList,
        vps: &VpsStateList,
    ) {
        self.bones = (0..bones.len())
            .map(|b| frame.bones.get(b).copied().flatten().unwrap_or(Pose::IDENTITY))
            .collect();
        self.vps = (0..vps.len())
            .map(|v| frame.vps.get(v).copied().flatten().unwrap_or(0.0))
            .collect();
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        vps: &mut VpsStateList,
        factor: f32,
    ) {
        let mode = self.common.blend_mode();
        let mask = self.channels.mask();
        if mask.any() {
            for &bone in self.common.bones() {
                let pose = if self.use_last_state {
                    bones.last_pose(bone)
                } else {
                    match self.bones.get(bone) {
                        Some(pose) => *pose,
                        None => continue,
                    }
                };
                bones.blend_pose(bone, &pose, mode, factor, mask);
            }
        }
        if self.channels.enable_vertex_position_set {
            for &v in self.common.vps() {
                let weight = if self.use_last_state {
                    vps.last_weight(v)
                } else {
                    match self.vps.get(v) {
                        Some(weight) => *weight,
                        None => continue,
                    }
                };
                vps.blend_weight(v, weight, mode, factor);
            }
        }
    }
}
