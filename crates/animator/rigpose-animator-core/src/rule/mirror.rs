use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::{blend_local_matrix, ChannelFlags, ParamContext, RuleCommon, RuleCommonDef};
use crate::state::BoneStateList;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MirrorAxis {
    #[default]
    X,
    Y,
    Z,
}

impl MirrorAxis {
    fn reflection(self) -> Mat4 {
        let scale = match self {
            MirrorAxis::X => Vec3::new(-1.0, 1.0, 1.0),
            MirrorAxis::Y => Vec3::new(1.0, -1.0, 1.0),
            MirrorAxis::Z => Vec3::new(1.0, 1.0, -1.0),
        };
        Mat4::from_scale(scale)
    }
}

/// Where in a bone name a [`MatchName`] pattern sits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchNameKind {
    #[default]
    First,
    Last,
    Middle,
}

/// Pair of name fragments identifying mirrored bones, e.g. `.l` and `.r`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchName {
    pub first: String,
    pub second: String,
    pub kind: MatchNameKind,
}

impl MatchName {
    pub fn new(first: impl Into<String>, second: impl Into<String>, kind: MatchNameKind) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            kind,
        }
    }

    /// `name` with one fragment swapped for the other, if it contains either.
    pub fn counterpart(&self, name: &str) -> Option<String> {
        Self::swap(name, &self.first, &self.second, self.kind)
            .or_else(|| Self::swap(name, &self.second, &self.first, self.kind))
    }

    fn swap(name: &str, from: &str, to: &str, kind: MatchNameKind) -> Option<String> {
        if from.is_empty() {
            return None;
        }
        match kind {
            MatchNameKind::First => name
                .strip_prefix(from)
                .map(|rest| format!("{to}{rest}")),
            MatchNameKind::Last => name
                .strip_suffix(from)
                .map(|rest| format!("{rest}{to}")),
            MatchNameKind::Middle => name.contains(from).then(|| name.replacen(from, to, 1)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    #[serde(flatten)]
    pub channels: ChannelFlags,
    pub mirror_axis: MirrorAxis,
    /// Bone whose frame holds the mirror plane; the component frame otherwise.
    pub mirror_bone: Option<String>,
    pub match_names: Vec<MatchName>,
}

/// Reflects paired bones across a plane and swaps their poses.
#[derive(Clone, Debug)]
pub struct MirrorRule {
    pub(super) common: RuleCommon,
    channels: ChannelFlags,
    axis: MirrorAxis,
    mirror_bone_name: Option<String>,
    match_names: Vec<MatchName>,
    mirror_bone: Option<usize>,
    /// Parallel to the mapped bones: the state each bone copies its mirrored pose from.
    partners: Vec<usize>,
}

impl MirrorRule {
    pub(super) fn new(def: &MirrorRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            channels: def.channels,
            axis: def.mirror_axis,
            mirror_bone_name: def.mirror_bone.clone(),
            match_names: def.match_names.clone(),
            mirror_bone: None,
            partners: Vec::new(),
        }
    }

    pub fn partners(&self) -> &[usize] {
        &self.partners
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        let bones = params.bones;
        self.mirror_bone = self
            .mirror_bone_name
            .as_deref()
            .and_then(|n| bones.index_of(n));
        self.partners = self
            .common
            .bones()
            .iter()
            .map(|&bone| {
                let name = bones.name(bone);
                self.match_names
                    .iter()
                    .filter_map(|m| m.counterpart(name))
                    .find_map(|other| bones.index_of(&other))
                    .unwrap_or(bone)
            })
            .collect();
    }

    pub(super) fn apply(&mut self, bones: &mut BoneStateList, factor: f32) {
        let mask = self.channels.mask();
        if !mask.any() || self.partners.is_empty() {
            return;
        }
        let reflection = self.axis.reflection();
        let frame = self
            .mirror_bone
            .map_or(Mat4::IDENTITY, |b| bones.global_matrix(b));
        let mirror = frame * reflection * frame.inverse();

        // reflect on both sides so the result stays a proper rotation
        let mirrored: Vec<Mat4> = self
            .partners
            .iter()
            .map(|&partner| mirror * bones.global_matrix(partner) * reflection)
            .collect();

        let mapped = self.common.bones();
        let mut locals = Vec::with_capacity(mapped.len());
        for (k, &bone) in mapped.iter().enumerate() {
            let parent_global = match bones.parent(bone) {
                Some(parent) => match mapped.iter().position(|&b| b == parent) {
                    Some(pk) => mirrored[pk],
                    None => bones.global_matrix(parent),
                },
                None => bones.parent_global_matrix(bone),
            };
            locals.push(bones.local_pose_under(bone, &parent_global, &mirrored[k]).matrix());
        }

        let mode = self.common.blend_mode();
        for (&bone, local) in mapped.iter().zip(&locals) {
            blend_local_matrix(bones, bone, local, mode, factor, mask);
        }
    }
}
