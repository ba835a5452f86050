//! Cyclic coordinate descent: rotate each link, tip first, a small capped step toward the goal.

use glam::Quat;

use super::chain::IkChain;
use super::{IkGoal, SolveReport, SolveStatus};
use crate::config::IkConfig;
use crate::math::EPSILON;

pub(super) fn solve(chain: &mut IkChain, goal: &IkGoal, config: &IkConfig) -> SolveReport {
    let base = chain.base_position();
    let goal_distance_sq = (goal.position - base).length_squared();
    let mut tip = chain.effector(goal.local_position);
    let mut distance = tip.distance(goal.position);
    let mut iterations = 0;
    let mut status = SolveStatus::Stalled;

    while iterations < config.ccd_max_iterations {
        if distance < config.tolerance {
            status = SolveStatus::Reached;
            break;
        }
        iterations += 1;

        for index in (0..chain.len()).rev() {
            let pivot = chain.link(index).position();
            let tip_vector = tip - pivot;
            let reach = tip_vector.length();
            if reach < EPSILON {
                continue;
            }
            let to_goal = goal.position - tip;
            if to_goal.length() < EPSILON {
                continue;
            }
            let Some(axis) = tip_vector.cross(to_goal).try_normalize() else {
                continue;
            };
            // Arc length along the tip's direction of travel, as an angle.
            let Some(gradient) = axis.cross(tip_vector).try_normalize() else {
                continue;
            };
            let angle = (to_goal.dot(gradient) / reach).min(config.ccd_max_step)
                * config.ccd_damping
                * chain.link(index).weight();
            if angle <= 0.0 {
                continue;
            }
            chain.rotate_link(index, Quat::from_axis_angle(axis, angle));
            tip = chain.effector(goal.local_position);
        }

        if let Some(orientation) = goal.orientation {
            chain.orient_tip(orientation);
        }
        tip = chain.effector(goal.local_position);

        let previous = distance;
        distance = tip.distance(goal.position);
        if distance < config.tolerance {
            status = SolveStatus::Reached;
            break;
        }
        if (previous - distance).abs() < config.min_improvement {
            if (tip - base).length_squared() < goal_distance_sq {
                status = SolveStatus::Unreachable;
            }
            break;
        }
    }

    SolveReport {
        status,
        iterations,
        distance,
    }
}
