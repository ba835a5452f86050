//! Forward-and-backward reaching IK on joint positions, followed by rotating every link onto
//! the solved positions.

use glam::{Quat, Vec3};

use super::chain::{IkChain, IkChainLink};
use super::{IkGoal, SolveReport, SolveStatus};
use crate::config::IkConfig;
use crate::math::EPSILON;

/// Sideways offset applied to interior joints, relative to their segment length.
const SINGULARITY_KICK: f32 = 0.1;

/// `None` when the chain has no length; the caller falls back to CCD.
pub(super) fn solve(chain: &mut IkChain, goal: &IkGoal, config: &IkConfig) -> Option<SolveReport> {
    let count = chain.len();

    // With a fixed tip orientation the effector offset is rigid, so solve for the tip joint.
    let (target, offset) = match goal.orientation {
        Some(orientation) => (goal.position - orientation * goal.local_position, None),
        None if goal.local_position.length_squared() > EPSILON * EPSILON => {
            (goal.position, Some(goal.local_position))
        }
        None => (goal.position, None),
    };

    let mut nodes: Vec<Vec3> = chain.links().iter().map(IkChainLink::position).collect();
    if let Some(offset) = offset {
        nodes.push(chain.effector(offset));
    }
    let lengths: Vec<f32> = nodes.windows(2).map(|w| w[0].distance(w[1])).collect();
    let total: f32 = lengths.iter().sum();
    if total < EPSILON {
        return None;
    }
    let rest_directions: Vec<Vec3> = nodes
        .windows(2)
        .map(|w| (w[1] - w[0]).normalize_or_zero())
        .collect();

    let base = nodes[0];
    let last = nodes.len() - 1;
    let goal_distance = base.distance(target);
    let mut iterations = 0;

    let mut status = if goal_distance >= total {
        let direction = (target - base).normalize_or_zero();
        for i in 1..=last {
            nodes[i] = nodes[i - 1] + direction * lengths[i - 1];
        }
        SolveStatus::Unreachable
    } else {
        let mut distance = nodes[last].distance(target);
        let mut kicked = false;
        let mut status = SolveStatus::Stalled;
        while iterations < config.max_iterations {
            if distance < config.tolerance {
                status = SolveStatus::Reached;
                break;
            }
            iterations += 1;

            nodes[last] = target;
            for i in (0..last).rev() {
                let direction = (nodes[i] - nodes[i + 1])
                    .try_normalize()
                    .unwrap_or(-rest_directions[i]);
                nodes[i] = nodes[i + 1] + direction * lengths[i];
            }
            nodes[0] = base;
            for i in 1..=last {
                let direction = (nodes[i] - nodes[i - 1])
                    .try_normalize()
                    .unwrap_or(rest_directions[i - 1]);
                nodes[i] = nodes[i - 1] + direction * lengths[i - 1];
            }

            let previous = distance;
            distance = nodes[last].distance(target);
            if distance < config.tolerance {
                status = SolveStatus::Reached;
                break;
            }
            if (previous - distance).abs() < config.min_improvement {
                if nodes[last].distance_squared(base) < goal_distance * goal_distance || kicked {
                    break;
                }
                kick_sideways(&mut nodes, &lengths);
                kicked = true;
            }
        }
        status
    };

    let effector_offset = offset.unwrap_or(Vec3::ZERO);
    for i in 0..last {
        let pivot = chain.link(i).position();
        let current = if i + 1 < count {
            chain.link(i + 1).position()
        } else {
            chain.effector(effector_offset)
        };
        let (Some(from), Some(to)) = (
            (current - pivot).try_normalize(),
            (nodes[i + 1] - pivot).try_normalize(),
        ) else {
            continue;
        };
        chain.rotate_link(i, Quat::from_rotation_arc(from, to));
    }
    if let Some(orientation) = goal.orientation {
        chain.orient_tip(orientation);
    }

    let distance = chain.effector(goal.local_position).distance(goal.position);
    if distance < config.tolerance {
        status = SolveStatus::Reached;
    } else if status == SolveStatus::Reached {
        status = SolveStatus::Stalled;
    }
    Some(SolveReport {
        status,
        iterations,
        distance,
    })
}

/// Push interior joints off the base-to-tip line so a straight chain can bend.
fn kick_sideways(nodes: &mut [Vec3], lengths: &[f32]) {
    let last = nodes.len() - 1;
    let axis = (nodes[last] - nodes[0]).try_normalize().unwrap_or(Vec3::X);
    let side = axis.any_orthonormal_vector();
    for i in 1..last {
        nodes[i] += side * lengths[i - 1] * SINGULARITY_KICK;
    }
    log::trace!("IK chain singular, kicked {} joints sideways", last.saturating_sub(1));
}
