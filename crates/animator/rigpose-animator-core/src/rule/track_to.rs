use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{blend_local_matrix, ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::blend::ChannelMask;
use crate::link::ControllerTarget;
use crate::math::{compose, decompose};
use crate::state::BoneStateList;

/// Signed bone axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackAxis {
    PositiveX,
    PositiveY,
    PositiveZ,
    NegativeX,
    NegativeY,
    NegativeZ,
}

impl TrackAxis {
    pub fn vector(self) -> Vec3 {
        match self {
            TrackAxis::PositiveX => Vec3::X,
            TrackAxis::PositiveY => Vec3::Y,
            TrackAxis::PositiveZ => Vec3::Z,
            TrackAxis::NegativeX => Vec3::NEG_X,
            TrackAxis::NegativeY => Vec3::NEG_Y,
            TrackAxis::NegativeZ => Vec3::NEG_Z,
        }
    }
}

/// Source of the up direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpTarget {
    WorldX,
    WorldY,
    WorldZ,
    ComponentX,
    ComponentY,
    #[default]
    ComponentZ,
    TrackBoneX,
    TrackBoneY,
    TrackBoneZ,
    /// Vector of the up target's controller.
    Controller,
}

/// Axis the bone may only rotate about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockedAxis {
    #[default]
    None,
    X,
    Y,
    Z,
}

impl LockedAxis {
    fn vector(self) -> Option<Vec3> {
        match self {
            LockedAxis::None => None,
            LockedAxis::X => Some(Vec3::X),
            LockedAxis::Y => Some(Vec3::Y),
            LockedAxis::Z => Some(Vec3::Z),
        }
    }
}

/// Turns bones so a chosen axis points at a bone or controller position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackToRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    pub track_bone: Option<String>,
    pub track_axis: TrackAxis,
    pub up_axis: TrackAxis,
    pub up_target: UpTarget,
    pub locked_axis: LockedAxis,
    /// Component-space position used without a track bone.
    pub target_position: ControllerTarget,
    pub target_up: ControllerTarget,
}

impl Default for TrackToRuleDef {
    fn default() -> Self {
        Self {
            common: RuleCommonDef::default(),
            track_bone: None,
            track_axis: TrackAxis::PositiveZ,
            up_axis: TrackAxis::PositiveY,
            up_target: UpTarget::ComponentY,
            locked_axis: LockedAxis::None,
            target_position: ControllerTarget::default(),
            target_up: ControllerTarget::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackToRule {
    pub(super) common: RuleCommon,
    def: TrackToRuleDef,
    track_bone: Option<usize>,
}

impl TrackToRule {
    pub(super) fn new(def: &TrackToRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
            track_bone: None,
        }
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) {
        self.track_bone = self
            .def
            .track_bone
            .as_deref()
            .and_then(|n| params.bones.index_of(n));
    }

    /// Up direction in component space; `None` when its source is missing.
    fn up_vector(&self, track: Option<&Mat4>, ctx: &RuleContext<'_>) -> Option<Vec3> {
        let world = |axis: Vec3| ctx.component_matrix.inverse().transform_vector3(axis);
        Some(match self.def.up_target {
            UpTarget::WorldX => world(Vec3::X),
            UpTarget::WorldY => world(Vec3::Y),
            UpTarget::WorldZ => world(Vec3::Z),
            UpTarget::ComponentX => Vec3::X,
            UpTarget::ComponentY => Vec3::Y,
            UpTarget::ComponentZ => Vec3::Z,
            UpTarget::TrackBoneX => track?.x_axis.truncate(),
            UpTarget::TrackBoneY => track?.y_axis.truncate(),
            UpTarget::TrackBoneZ => track?.z_axis.truncate(),
            UpTarget::Controller => ctx.target_vector(&self.def.target_up, Vec3::Y),
        })
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        let track = self.track_bone.map(|t| bones.global_matrix(t));
        let target = match &track {
            Some(m) => m.w_axis.truncate(),
            None => ctx.target_vector(&self.def.target_position, Vec3::ZERO),
        };
        let mode = self.common.blend_mode();

        for &bone in self.common.bones() {
            if Some(bone) == self.track_bone {
                continue;
            }
            let global = bones.global_matrix(bone);
            let (position, orientation, scale) = decompose(&global);

            let mut direction = target - position;
            let (local_up, up) = match self.def.locked_axis.vector() {
                Some(axis) => {
                    // only turn about the locked axis
                    let up = orientation * axis;
                    direction -= up * direction.dot(up);
                    (axis, up)
                }
                None => match self.up_vector(track.as_ref(), ctx) {
                    Some(up) => (self.def.up_axis.vector(), up),
                    None => continue,
                },
            };
            let track_axis = self.def.track_axis.vector();
            let Some(rotation) = aim(track_axis, local_up, direction, up) else {
                continue;
            };
            let moved = compose(position, rotation, scale);
            let local = bones.local_pose_from_global(bone, &moved).matrix();
            blend_local_matrix(bones, bone, &local, mode, factor, ChannelMask::ORIENTATION);
        }
    }
}

/// Rotation taking `local_track` onto `direction` and `local_up` as close to `up` as possible.
/// `None` for degenerate inputs.
fn aim(local_track: Vec3, local_up: Vec3, direction: Vec3, up: Vec3) -> Option<Quat> {
    let track = direction.try_normalize()?;
    let side = track.cross(up).try_normalize()?;
    let up = side.cross(track);

    let local_side = local_track.cross(local_up).try_normalize()?;
    let local_up = local_side.cross(local_track);

    let world = Mat3::from_cols(track, up, side);
    let local = Mat3::from_cols(local_track, local_up, local_side);
    Some(Quat::from_mat3(&(world * local.transpose())).normalize())
}
