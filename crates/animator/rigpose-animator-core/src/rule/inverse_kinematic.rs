use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{ParamContext, RuleCommon, RuleCommonDef, RuleContext};
use crate::blend::{BlendMode, ChannelMask, Pose};
use crate::error::Result;
use crate::ik::{self, IkChain, IkGoal, IkSolverKind, SolveReport};
use crate::link::ControllerTarget;
use crate::math::{compose, decompose, position_of, quat_from_euler, rotation_of};
use crate::state::BoneStateList;

/// Moves a bone chain so its tip reaches a goal.
///
/// The chain runs between the first and second listed bone, one being an ancestor of the other.
/// A single listed bone is placed directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InverseKinematicRuleDef {
    #[serde(flatten)]
    pub common: RuleCommonDef,
    pub solver: IkSolverKind,
    pub goal_position: Vec3,
    /// Euler angles in radians.
    pub goal_orientation: Vec3,
    /// End effector offset in the tip bone's space.
    pub local_position: Vec3,
    pub local_orientation: Vec3,
    /// Turn the tip to the goal orientation as well.
    pub adjust_orientation: bool,
    /// Read the goal in the solver bone's space.
    pub use_solver_bone: bool,
    pub solver_bone: Option<String>,
    /// Radius of the reach sphere; below the reach epsilon the goal is not clamped.
    pub reach_range: f32,
    pub reach_bone: Option<String>,
    pub reach_center: Vec3,
    pub target_goal_position: ControllerTarget,
    pub target_goal_orientation: ControllerTarget,
    pub target_local_position: ControllerTarget,
    pub target_local_orientation: ControllerTarget,
    pub target_reach_range: ControllerTarget,
    pub target_reach_center: ControllerTarget,
}

#[derive(Clone, Debug)]
pub struct InverseKinematicRule {
    pub(super) common: RuleCommon,
    def: InverseKinematicRuleDef,
    chain: IkChain,
    solver_bone: Option<usize>,
    reach_bone: Option<usize>,
    last_report: Option<SolveReport>,
}

impl InverseKinematicRule {
    pub(super) fn new(def: &InverseKinematicRuleDef) -> Self {
        Self {
            common: RuleCommon::new(&def.common),
            def: def.clone(),
            chain: IkChain::empty(),
            solver_bone: None,
            reach_bone: None,
            last_report: None,
        }
    }

    pub fn chain(&self) -> &IkChain {
        &self.chain
    }

    /// Outcome of the most recent multi-bone solve.
    pub fn last_report(&self) -> Option<SolveReport> {
        self.last_report
    }

    pub(super) fn update_parameters(&mut self, params: &ParamContext<'_>) -> Result<()> {
        let bones = params.bones;
        let names = self.common.bone_names();
        let ids: Vec<Option<usize>> = names.iter().map(|n| bones.index_of(n)).collect();
        self.chain = match ids.as_slice() {
            [Some(first), Some(second)] => IkChain::between(bones, *first, *second)?,
            [Some(bone)] => IkChain::single(bones, *bone)?,
            _ => {
                if !names.is_empty() {
                    log::debug!(
                        "rule '{}': IK needs one or two known bones, got {:?}",
                        self.common.name(),
                        names
                    );
                }
                IkChain::empty()
            }
        };
        self.solver_bone = self
            .def
            .solver_bone
            .as_deref()
            .and_then(|n| bones.index_of(n));
        self.reach_bone = self
            .def
            .reach_bone
            .as_deref()
            .and_then(|n| bones.index_of(n));
        Ok(())
    }

    pub(super) fn apply(
        &mut self,
        bones: &mut BoneStateList,
        ctx: &RuleContext<'_>,
        factor: f32,
    ) {
        if self.chain.is_empty() {
            return;
        }
        let def = &self.def;
        let config = &ctx.config.ik;

        let goal_position = ctx.target_vector(&def.target_goal_position, def.goal_position);
        let goal_orientation = ctx.target_quaternion(
            &def.target_goal_orientation,
            quat_from_euler(def.goal_orientation),
        );
        let local_position = ctx.target_vector(&def.target_local_position, def.local_position);
        let local_orientation = ctx.target_quaternion(
            &def.target_local_orientation,
            quat_from_euler(def.local_orientation),
        );
        let reach_range = def.reach_range
            * ctx
                .target_value(&def.target_reach_range, 1.0)
                .clamp(0.0, 1.0);
        let reach_center = ctx.target_vector(&def.target_reach_center, def.reach_center);

        let solver = if def.use_solver_bone {
            self.solver_bone.map(|b| bones.global_matrix(b))
        } else {
            None
        };
        let mut goal = match &solver {
            Some(m) => m.transform_point3(goal_position),
            None => goal_position,
        };
        let orientation = def.adjust_orientation.then(|| {
            let base = solver.as_ref().map_or(Quat::IDENTITY, rotation_of);
            (base * goal_orientation * local_orientation).normalize()
        });
        let center = match self.reach_bone {
            Some(b) => bones.global_matrix(b).transform_point3(reach_center),
            None => reach_center,
        };
        goal = ik::limit_reach(goal, reach_range, center, config.reach_epsilon);

        let mode = self.common.blend_mode();
        if self.chain.len() == 1 {
            let bone = self.chain.link(0).bone();
            place_single(bones, bone, goal, orientation, local_position, mode, factor);
            return;
        }

        self.chain.capture(bones, config.min_link_weight);
        let report = ik::solve(
            &mut self.chain,
            &IkGoal {
                position: goal,
                orientation,
                local_position,
            },
            def.solver,
            config,
        );
        log::trace!(
            "rule '{}': {:?} after {} iterations, distance {}",
            self.common.name(),
            report.status,
            report.iterations,
            report.distance
        );
        self.last_report = Some(report);
        self.chain.write_back(bones, mode, factor);
    }
}

/// Closed form for a one-bone chain: move the bone so its effector sits on the goal.
fn place_single(
    bones: &mut BoneStateList,
    bone: usize,
    goal: Vec3,
    orientation: Option<Quat>,
    local_position: Vec3,
    mode: BlendMode,
    factor: f32,
) {
    let current = bones.global_matrix(bone);
    let (_, current_rotation, scale) = decompose(&current);
    let target = compose(goal, orientation.unwrap_or(current_rotation), scale);
    let parent = bones.parent_global_matrix(bone);
    let local = *bones.state(bone).inverse_rig_local_matrix() * parent.inverse() * target;

    let current_pose = bones.pose(bone);
    let (pose, mask) = match orientation {
        Some(_) => (
            Pose::new(
                local.transform_point3(-local_position),
                rotation_of(&local),
                current_pose.scale,
            ),
            ChannelMask::POSITION_ORIENTATION,
        ),
        None => (
            Pose::new(
                position_of(&local) - local_position,
                current_pose.orientation,
                current_pose.scale,
            ),
            ChannelMask::POSITION,
        ),
    };
    bones.blend_toward(bone, &pose, mode, factor, mask);
}
