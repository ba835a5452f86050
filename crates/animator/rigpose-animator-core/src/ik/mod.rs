//! Inverse kinematics for bone chains.
//!
//! Flow per solve: build the chain (on parameter refresh), [`IkChain::capture`] the current
//! matrices, clamp the goal to the reach sphere, run FABRIK or CCD on the working matrices and
//! finally [`IkChain::write_back`] through the blend accumulator.

mod ccd;
mod chain;
mod fabrik;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub use chain::{AxisLimit, IkChain, IkChainLink};

use crate::config::IkConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IkSolverKind {
    #[default]
    Fabrik,
    Ccd,
}

/// Where the chain should end up, in component space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkGoal {
    pub position: Vec3,
    /// Tip orientation to enforce; `None` leaves the tip free to rotate.
    pub orientation: Option<Quat>,
    /// End effector offset in the tip bone's space.
    pub local_position: Vec3,
}

impl IkGoal {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: None,
            local_position: Vec3::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// Effector within tolerance of the goal.
    Reached,
    /// Goal out of reach; the chain points at it as far as it can.
    Unreachable,
    /// No further progress; best effort kept.
    Stalled,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Final effector to goal distance.
    pub distance: f32,
}

/// Solve a chain of at least two links in place. FABRIK hands over to CCD when the chain has
/// no length to work with.
pub fn solve(
    chain: &mut IkChain,
    goal: &IkGoal,
    kind: IkSolverKind,
    config: &IkConfig,
) -> SolveReport {
    match kind {
        IkSolverKind::Fabrik => match fabrik::solve(chain, goal, config) {
            Some(report) => report,
            None => {
                log::trace!("zero length IK chain, falling back to CCD");
                ccd::solve(chain, goal, config)
            }
        },
        IkSolverKind::Ccd => ccd::solve(chain, goal, config),
    }
}

/// Pull `goal` onto the sphere of radius `range` around `center` when it lies outside. Ranges
/// below `epsilon` disable the clamp.
pub fn limit_reach(goal: Vec3, range: f32, center: Vec3, epsilon: f32) -> Vec3 {
    if range < epsilon {
        return goal;
    }
    let diff = goal - center;
    let length = diff.length();
    if length > range {
        center + diff * (range / length)
    } else {
        goal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reach_clamp_projects_onto_sphere() {
        let goal = limit_reach(Vec3::new(4.0, 0.0, 0.0), 2.0, Vec3::X, 1e-4);
        assert!((goal - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn tiny_reach_range_is_ignored() {
        let goal = Vec3::new(4.0, 0.0, 0.0);
        assert_eq!(limit_reach(goal, 5e-5, Vec3::ZERO, 1e-4), goal);
    }
}
