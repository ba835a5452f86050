//! The bone state graph: an index arena of [`BoneState`] nodes.
//!
//! Invariants:
//! - a dirty node has only dirty descendants, so marking stops at the first dirty node;
//! - `update_matrices_of` walks up to the first clean ancestor and recomputes downwards, each
//!   node once, clearing `dirty` after both local and global matrices are current.

use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

use super::bone::BoneState;
use crate::blend::{blend_pose, overlay_delta, BlendMode, ChannelMask, Pose};
use crate::component::Component;
use crate::error::Result;
use crate::math::EPSILON;
use crate::rig::Rig;

#[derive(Clone, Debug, Default)]
pub struct BoneStateList {
    states: Vec<BoneState>,
    lookup: HashMap<String, usize>,
    matrix_updates: u64,
}

impl BoneStateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
            matrix_updates: 0,
        }
    }

    /// Rebuild the topology from `rig`. A non-empty `filter` keeps only the named bones; parent
    /// links to bones outside the filter are cleared.
    pub fn rebuild(&mut self, rig: &Rig, filter: &[String], protect_dynamic: bool) -> Result<()> {
        self.states.clear();
        self.lookup.clear();

        let included: Vec<usize> = if filter.is_empty() {
            (0..rig.len()).collect()
        } else {
            (0..rig.len())
                .filter(|&i| filter.iter().any(|name| *name == rig.bone(i).name))
                .collect()
        };
        self.states.try_reserve_exact(included.len())?;

        let mut rig_to_state: Vec<Option<usize>> = vec![None; rig.len()];
        for &rig_index in &included {
            let bone = rig.bone(rig_index);
            let mut state = BoneState::new(bone.name.clone(), Some(rig_index), bone.rest_matrix());
            state.protected = protect_dynamic && bone.dynamic;
            state.ik_limits = bone.ik_limits;
            rig_to_state[rig_index] = Some(self.states.len());
            self.lookup
                .entry(bone.name.clone())
                .or_insert(self.states.len());
            self.states.push(state);
        }

        for index in 0..self.states.len() {
            let parent = self.states[index]
                .rig_index
                .and_then(|ri| rig.bone(ri).parent)
                .and_then(|rp| rig_to_state.get(rp).copied().flatten());
            self.states[index].parent = parent;
            if let Some(p) = parent {
                self.states[p].children.push(index);
            }
        }

        log::debug!(
            "rebuilt bone state list: {} of {} rig bones",
            self.states.len(),
            rig.len()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn state(&self, index: usize) -> &BoneState {
        &self.states[index]
    }

    pub fn states(&self) -> &[BoneState] {
        &self.states
    }

    pub fn name(&self, index: usize) -> &str {
        &self.states[index].name
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.states[index].parent
    }

    pub fn pose(&self, index: usize) -> Pose {
        self.states[index].pose
    }

    pub fn last_pose(&self, index: usize) -> Pose {
        self.states[index].last_pose
    }

    pub fn set_pose(&mut self, index: usize, pose: Pose) {
        self.states[index].pose = pose;
        self.mark_dirty(index);
    }

    pub fn set_position(&mut self, index: usize, position: Vec3) {
        self.states[index].pose.position = position;
        self.mark_dirty(index);
    }

    pub fn set_orientation(&mut self, index: usize, orientation: Quat) {
        self.states[index].pose.orientation = orientation;
        self.mark_dirty(index);
    }

    pub fn set_scale(&mut self, index: usize, scale: Vec3) {
        self.states[index].pose.scale = scale;
        self.mark_dirty(index);
    }

    /// Blend `incoming` into bone `index`; a no-op blend leaves the matrices clean.
    pub fn blend_pose(
        &mut self,
        index: usize,
        incoming: &Pose,
        mode: BlendMode,
        factor: f32,
        mask: ChannelMask,
    ) {
        let current = self.states[index].pose;
        let blended = blend_pose(&current, incoming, mode, factor, mask);
        if blended != current {
            self.set_pose(index, blended);
        }
    }

    /// Blend toward an absolute target pose. Overlay adds the per-channel change that reaches
    /// `target`, so a full-strength overlay lands on it like a blend does.
    pub fn blend_toward(
        &mut self,
        index: usize,
        target: &Pose,
        mode: BlendMode,
        factor: f32,
        mask: ChannelMask,
    ) {
        let incoming = match mode {
            BlendMode::Blend => *target,
            BlendMode::Overlay => overlay_delta(&self.states[index].pose, target),
        };
        self.blend_pose(index, &incoming, mode, factor, mask);
    }

    /// Reset every pose to identity.
    pub fn reset_poses(&mut self) {
        for state in &mut self.states {
            state.pose = Pose::IDENTITY;
            state.dirty = true;
        }
    }

    /// Copy poses and root placements of `other`, which must share this list's topology.
    pub fn copy_poses_from(&mut self, other: &BoneStateList) {
        assert_eq!(self.states.len(), other.states.len());
        for (dst, src) in self.states.iter_mut().zip(&other.states) {
            dst.pose = src.pose;
            dst.last_pose = src.last_pose;
            dst.rig_local = src.rig_local;
            dst.inverse_rig_local = src.inverse_rig_local;
            dst.dirty = true;
        }
    }

    /// Mark `index` and its whole subtree dirty.
    pub fn mark_dirty(&mut self, index: usize) {
        if self.states[index].dirty {
            return;
        }
        self.states[index].dirty = true;
        for c in 0..self.states[index].children.len() {
            let child = self.states[index].children[c];
            self.mark_dirty(child);
        }
    }

    pub fn update_matrices(&mut self) {
        for index in 0..self.states.len() {
            self.update_matrices_of(index);
        }
    }

    /// Bring bone `index` and its ancestors up to date.
    pub fn update_matrices_of(&mut self, index: usize) {
        if !self.states[index].dirty {
            return;
        }
        let parent_global = match self.states[index].parent {
            Some(parent) => {
                self.update_matrices_of(parent);
                self.states[parent].global
            }
            None => Mat4::IDENTITY,
        };

        let state = &mut self.states[index];
        state.local = state.pose.matrix();
        state.inverse_local = state.local.inverse();
        state.global = parent_global * state.rig_local * state.local;
        state.inverse_global = state.global.inverse();
        state.dirty = false;
        self.matrix_updates += 1;
    }

    /// Number of node recomputations since creation.
    pub fn matrix_update_count(&self) -> u64 {
        self.matrix_updates
    }

    pub fn global_matrix(&mut self, index: usize) -> Mat4 {
        self.update_matrices_of(index);
        self.states[index].global
    }

    pub fn inverse_global_matrix(&mut self, index: usize) -> Mat4 {
        self.update_matrices_of(index);
        self.states[index].inverse_global
    }

    /// Component-space matrix of the parent; identity at a root.
    pub fn parent_global_matrix(&mut self, index: usize) -> Mat4 {
        match self.states[index].parent {
            Some(parent) => self.global_matrix(parent),
            None => Mat4::IDENTITY,
        }
    }

    /// Pose that places bone `index` at component-space matrix `global` under its current parent.
    pub fn local_pose_from_global(&mut self, index: usize, global: &Mat4) -> Pose {
        let parent_inverse = match self.states[index].parent {
            Some(parent) => self.inverse_global_matrix(parent),
            None => Mat4::IDENTITY,
        };
        let local = self.states[index].inverse_rig_local * parent_inverse * *global;
        Pose::from_matrix(&local)
    }

    /// Same as [`Self::local_pose_from_global`] with an explicit parent matrix.
    pub fn local_pose_under(&self, index: usize, parent_global: &Mat4, global: &Mat4) -> Pose {
        let local = self.states[index].inverse_rig_local * parent_global.inverse() * *global;
        Pose::from_matrix(&local)
    }

    /// Read the component's pose into every mapped bone.
    ///
    /// Bones without a parent state whose rig bone has a parent get their rig-local matrix
    /// replaced by the component-space placement of that rig parent.
    pub fn update_from_component(&mut self, component: &Component) {
        let rig = component.rig().cloned();
        for state in &mut self.states {
            let pose = match state.rig_index {
                Some(ri) if ri < component.bone_count() => *component.bone(ri),
                _ => Pose::IDENTITY,
            };
            state.pose = pose;
            state.last_pose = pose;
            state.dirty = true;

            if state.parent.is_none() {
                if let (Some(rig), Some(ri)) = (rig.as_ref(), state.rig_index) {
                    if ri < rig.len() {
                        let bone = rig.bone(ri);
                        let rig_local = match bone.parent {
                            Some(rp) if rp < component.bone_count() => {
                                component.bone_component_matrix(rp) * bone.rest_matrix()
                            }
                            _ => bone.rest_matrix(),
                        };
                        state.rig_local = rig_local;
                        state.inverse_rig_local = rig_local.inverse();
                    }
                }
            }
        }
    }

    /// Write poses back to the component, overwriting or blending. Protected bones are skipped
    /// and scale components within epsilon of 1 snap to 1.
    pub fn apply_to_component(&self, component: &mut Component, blend: Option<(BlendMode, f32)>) {
        for state in &self.states {
            let Some(ri) = state.rig_index else {
                continue;
            };
            if state.protected || ri >= component.bone_count() {
                continue;
            }
            let mut pose = match blend {
                None => state.pose,
                Some((mode, factor)) => {
                    blend_pose(component.bone(ri), &state.pose, mode, factor, ChannelMask::ALL)
                }
            };
            pose.scale = snap_unit_scale(pose.scale);
            component.set_bone(ri, pose);
        }
        component.invalidate_bones();
    }
}

fn snap_unit_scale(scale: Vec3) -> Vec3 {
    let snap = |v: f32| if (v - 1.0).abs() < EPSILON { 1.0 } else { v };
    Vec3::new(snap(scale.x), snap(scale.y), snap(scale.z))
}
