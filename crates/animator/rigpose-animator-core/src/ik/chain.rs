//! IK working state: the chain of bones being solved, their limits and component-space matrices.
//!
//! Solvers only touch the matrices stored here. The bone graph is updated once, by
//! [`IkChain::write_back`], after solving finished.

use glam::{Mat4, Quat, Vec3};

use crate::blend::{BlendMode, ChannelMask, Pose};
use crate::error::Result;
use crate::math::{compose, decompose, position_of, quat_from_euler, quat_to_euler, EPSILON};
use crate::rig::BoneIkLimits;
use crate::state::BoneStateList;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxisLimit {
    #[default]
    Free,
    Limited,
    Locked,
}

#[derive(Clone, Debug)]
pub struct IkChainLink {
    bone: usize,
    axes: [AxisLimit; 3],
    /// Limits relative to `zero`.
    lower: Vec3,
    upper: Vec3,
    zero: Quat,
    zero_inverse: Quat,
    damping: Vec3,
    /// Limit-space Euler angles at solve start; locked axes keep these.
    locked_rotation: Vec3,
    weight: f32,
    has_limits: bool,
    rig_local: Mat4,
    global: Mat4,
}

impl IkChainLink {
    fn new(bone: usize, rig_local: Mat4) -> Self {
        Self {
            bone,
            axes: [AxisLimit::Free; 3],
            lower: Vec3::ZERO,
            upper: Vec3::ZERO,
            zero: Quat::IDENTITY,
            zero_inverse: Quat::IDENTITY,
            damping: Vec3::ONE,
            locked_rotation: Vec3::ZERO,
            weight: 1.0,
            has_limits: false,
            rig_local,
            global: Mat4::IDENTITY,
        }
    }

    fn init_limits(&mut self, limits: &BoneIkLimits) {
        let mut center = Vec3::ZERO;
        let mut damping = Vec3::ONE;
        let mut limited = false;

        for axis in 0..3 {
            self.axes[axis] = if limits.locked[axis] {
                limited = true;
                AxisLimit::Locked
            } else if limits.lower[axis] < limits.upper[axis] {
                limited = true;
                center[axis] = 0.5 * (limits.lower[axis] + limits.upper[axis]);
                damping[axis] = 1.0 - limits.resistance[axis].clamp(0.0, 1.0);
                AxisLimit::Limited
            } else {
                damping[axis] = 1.0 - limits.resistance[axis].clamp(0.0, 1.0);
                AxisLimit::Free
            };
        }

        self.zero = quat_from_euler(center);
        self.zero_inverse = self.zero.inverse();
        self.lower = limits.lower - center;
        self.upper = limits.upper - center;
        self.damping = damping;
        self.has_limits = limited || self.has_damping();
    }

    fn has_damping(&self) -> bool {
        (self.damping - Vec3::ONE).abs().max_element() > EPSILON
    }

    pub fn bone(&self) -> usize {
        self.bone
    }

    pub fn axis(&self, axis: usize) -> AxisLimit {
        self.axes[axis]
    }

    pub fn damping(&self) -> Vec3 {
        self.damping
    }

    /// Chain weight in `[min_link_weight, 1]`, growing from base to tip.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn has_limits(&self) -> bool {
        self.has_limits
    }

    /// Component-space matrix in the working state.
    pub fn global(&self) -> &Mat4 {
        &self.global
    }

    pub fn position(&self) -> Vec3 {
        position_of(&self.global)
    }

    /// Damp and clamp a proposed bone-local rotation against the current one.
    fn constrain(&self, proposed: Quat, current: Quat) -> Quat {
        let proposed = self.zero_inverse * proposed;
        let current = self.zero_inverse * current;

        let damped = if self.has_damping() {
            let diff = quat_to_euler(proposed * current.inverse()) * self.damping;
            quat_from_euler(diff) * current
        } else {
            proposed
        };

        let mut euler = quat_to_euler(damped);
        for axis in 0..3 {
            match self.axes[axis] {
                AxisLimit::Locked => euler[axis] = self.locked_rotation[axis],
                AxisLimit::Limited => {
                    euler[axis] = euler[axis].clamp(self.lower[axis], self.upper[axis])
                }
                AxisLimit::Free => {}
            }
        }
        self.zero * quat_from_euler(euler)
    }
}

/// Bones from chain base to tip; each link's bone is the parent state of the next one.
#[derive(Clone, Debug, Default)]
pub struct IkChain {
    links: Vec<IkChainLink>,
    /// Component-space matrix of the base bone's parent state.
    base_parent: Mat4,
}

impl IkChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chain between two bones where one is an ancestor of the other, root first. Empty when
    /// neither is, or when both name the same bone.
    pub fn between(bones: &BoneStateList, first: usize, second: usize) -> Result<Self> {
        if first == second {
            return Ok(Self::empty());
        }
        let path = ancestor_path(bones, first, second)
            .or_else(|| ancestor_path(bones, second, first));
        match path {
            Some(path) => Self::from_path(bones, &path),
            None => {
                log::debug!(
                    "no IK chain between '{}' and '{}'",
                    bones.name(first),
                    bones.name(second)
                );
                Ok(Self::empty())
            }
        }
    }

    pub fn single(bones: &BoneStateList, bone: usize) -> Result<Self> {
        Self::from_path(bones, &[bone])
    }

    fn from_path(bones: &BoneStateList, path: &[usize]) -> Result<Self> {
        let mut links = Vec::new();
        links.try_reserve_exact(path.len())?;
        for &bone in path {
            let state = bones.state(bone);
            let mut link = IkChainLink::new(bone, *state.rig_local_matrix());
            link.init_limits(state.ik_limits());
            links.push(link);
        }
        Ok(Self {
            links,
            base_parent: Mat4::IDENTITY,
        })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[IkChainLink] {
        &self.links
    }

    pub fn link(&self, index: usize) -> &IkChainLink {
        &self.links[index]
    }

    pub fn has_limits(&self) -> bool {
        self.links.iter().any(IkChainLink::has_limits)
    }

    /// Load matrices from the bone graph, capture locked rotations and derive link weights.
    pub fn capture(&mut self, bones: &mut BoneStateList, min_link_weight: f32) {
        let Some(base) = self.links.first().map(IkChainLink::bone) else {
            return;
        };
        self.base_parent = bones.parent_global_matrix(base);
        for link in &mut self.links {
            link.global = bones.global_matrix(link.bone);
        }
        for index in 0..self.links.len() {
            let local = self.local_rotation(index);
            let link = &mut self.links[index];
            link.locked_rotation = quat_to_euler(link.zero_inverse * local);
        }
        self.init_weights(min_link_weight);
    }

    fn init_weights(&mut self, min_link_weight: f32) {
        let mut distances = Vec::with_capacity(self.links.len());
        let mut total = 0.0;
        let mut previous = None;
        for link in &self.links {
            let position = link.position();
            if let Some(previous) = previous {
                total += position.distance(previous);
            }
            distances.push(total);
            previous = Some(position);
        }
        for (link, distance) in self.links.iter_mut().zip(distances) {
            link.weight = if total < EPSILON {
                1.0
            } else {
                min_link_weight + (1.0 - min_link_weight) * (distance / total)
            };
        }
    }

    /// Matrix a link's local pose is applied under: parent global times rig-local.
    fn frame_of(&self, index: usize) -> Mat4 {
        let parent = if index == 0 {
            self.base_parent
        } else {
            self.links[index - 1].global
        };
        parent * self.links[index].rig_local
    }

    fn local_rotation(&self, index: usize) -> Quat {
        decompose(&(self.frame_of(index).inverse() * self.links[index].global)).1
    }

    /// Point at `local_position` in the tip bone's space.
    pub fn effector(&self, local_position: Vec3) -> Vec3 {
        self.links
            .last()
            .map_or(Vec3::ZERO, |tip| tip.global.transform_point3(local_position))
    }

    pub fn base_position(&self) -> Vec3 {
        self.links.first().map_or(Vec3::ZERO, IkChainLink::position)
    }

    /// Rotate link `index` about its own position by a component-space rotation, honoring its
    /// limits, and carry every link further down the chain along.
    pub fn rotate_link(&mut self, index: usize, rotation: Quat) {
        let current = self.links[index].global;
        let pivot = position_of(&current);
        let mut target = Mat4::from_translation(pivot)
            * Mat4::from_quat(rotation)
            * Mat4::from_translation(-pivot)
            * current;

        if self.links[index].has_limits {
            let frame = self.frame_of(index);
            let frame_inverse = frame.inverse();
            let (position, current_local, scale) = decompose(&(frame_inverse * current));
            let proposed_local = decompose(&(frame_inverse * target)).1;
            let constrained = self.links[index].constrain(proposed_local, current_local);
            target = frame * compose(position, constrained, scale);
        }

        let delta = target * current.inverse();
        for link in &mut self.links[index..] {
            link.global = delta * link.global;
        }
    }

    /// Force the tip's component-space orientation, keeping its position.
    pub fn orient_tip(&mut self, orientation: Quat) {
        if let Some(tip) = self.links.last_mut() {
            let (position, _, scale) = decompose(&tip.global);
            tip.global = compose(position, orientation, scale);
        }
    }

    /// Convert the working matrices back to bone-local poses and blend position and orientation
    /// into the graph.
    pub fn write_back(&self, bones: &mut BoneStateList, mode: BlendMode, factor: f32) {
        for (index, link) in self.links.iter().enumerate() {
            let parent = if index == 0 {
                self.base_parent
            } else {
                self.links[index - 1].global
            };
            let local =
                *bones.state(link.bone).inverse_rig_local_matrix() * parent.inverse() * link.global;
            let pose = Pose::from_matrix(&local);
            bones.blend_toward(
                link.bone,
                &pose,
                mode,
                factor,
                ChannelMask::POSITION_ORIENTATION,
            );
        }
    }
}

/// `[ancestor, ..., descendant]` when `ancestor` is a strict ancestor of `descendant`.
fn ancestor_path(bones: &BoneStateList, ancestor: usize, descendant: usize) -> Option<Vec<usize>> {
    let mut path = vec![descendant];
    let mut cursor = bones.parent(descendant);
    while let Some(parent) = cursor {
        path.push(parent);
        if parent == ancestor {
            path.reverse();
            return Some(path);
        }
        cursor = bones.parent(parent);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::{Rig, RigBone};

    fn arm() -> BoneStateList {
        let rig = Rig::new(vec![
            RigBone::new("root", None, Vec3::ZERO),
            RigBone::new("shoulder", Some(0), Vec3::Y),
            RigBone::new("elbow", Some(1), Vec3::X),
            RigBone::new("wrist", Some(2), Vec3::X),
            RigBone::new("other", Some(0), Vec3::Z),
        ]);
        let mut bones = BoneStateList::new();
        bones.rebuild(&rig, &[], false).unwrap();
        bones
    }

    #[test]
    fn chain_is_root_first_in_either_order() {
        let bones = arm();
        let a = IkChain::between(&bones, 0, 3).unwrap();
        let b = IkChain::between(&bones, 3, 0).unwrap();
        let order = |c: &IkChain| c.links().iter().map(|l| l.bone()).collect::<Vec<_>>();
        assert_eq!(order(&a), vec![0, 1, 2, 3]);
        assert_eq!(order(&a), order(&b));
    }

    #[test]
    fn unrelated_bones_give_empty_chain() {
        let bones = arm();
        assert!(IkChain::between(&bones, 3, 4).unwrap().is_empty());
        assert!(IkChain::between(&bones, 2, 2).unwrap().is_empty());
    }

    #[test]
    fn weights_grow_from_base_to_tip() {
        let mut bones = arm();
        let mut chain = IkChain::between(&bones, 0, 3).unwrap();
        chain.capture(&mut bones, 0.1);
        let weights: Vec<f32> = chain.links().iter().map(|l| l.weight()).collect();
        assert!((weights[0] - 0.1).abs() < 1e-6);
        assert!((weights[3] - 1.0).abs() < 1e-6);
        assert!(weights.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn locked_axis_keeps_rotation() {
        let rig = Rig::new(vec![
            RigBone::new("a", None, Vec3::ZERO),
            RigBone {
                ik_limits: BoneIkLimits {
                    locked: [true, true, true],
                    ..BoneIkLimits::default()
                },
                ..RigBone::new("b", Some(0), Vec3::X)
            },
        ]);
        let mut bones = BoneStateList::new();
        bones.rebuild(&rig, &[], false).unwrap();
        let mut chain = IkChain::between(&bones, 0, 1).unwrap();
        chain.capture(&mut bones, 0.1);
        let before = *chain.link(1).global();
        chain.rotate_link(1, Quat::from_rotation_z(0.5));
        assert!(chain.link(1).global().abs_diff_eq(before, 1e-5));
    }
}
