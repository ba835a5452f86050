//! External component representation: the bone array and morph weights an instance writes to.
//!
//! Several instances may target one component. It is shared as [`SharedComponent`] and locked
//! only for short reads and writes; the `animator_task` token names the single task allowed to
//! write it while a rule pass is in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Mat4;

use crate::blend::Pose;
use crate::rig::{Model, Rig};
use crate::task::{TaskHandle, TaskId};

pub type SharedComponent = Arc<Mutex<Component>>;

/// Lock a shared component, ignoring poisoning from a panicked task.
pub fn lock_component(component: &SharedComponent) -> MutexGuard<'_, Component> {
    component.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct Component {
    rig: Option<Arc<Rig>>,
    model: Option<Arc<Model>>,
    bones: Vec<Pose>,
    vps_weights: Vec<f32>,
    matrix: Mat4,
    bone_revision: u64,
    vps_revision: u64,
    animator_task: Option<TaskHandle>,
}

impl Component {
    pub fn new(rig: Arc<Rig>) -> Self {
        let bones = vec![Pose::IDENTITY; rig.len()];
        Self {
            rig: Some(rig),
            model: None,
            bones,
            vps_weights: Vec::new(),
            matrix: Mat4::IDENTITY,
            bone_revision: 0,
            vps_revision: 0,
            animator_task: None,
        }
    }

    pub fn with_model(mut self, model: Arc<Model>) -> Self {
        self.vps_weights = vec![0.0; model.vertex_position_sets.len()];
        self.model = Some(model);
        self
    }

    pub fn shared(self) -> SharedComponent {
        Arc::new(Mutex::new(self))
    }

    pub fn rig(&self) -> Option<&Arc<Rig>> {
        self.rig.as_ref()
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> &Pose {
        &self.bones[index]
    }

    pub fn bones(&self) -> &[Pose] {
        &self.bones
    }

    pub fn set_bone(&mut self, index: usize, pose: Pose) {
        self.bones[index] = pose;
    }

    pub fn vps_count(&self) -> usize {
        self.vps_weights.len()
    }

    pub fn vps_weight(&self, index: usize) -> f32 {
        self.vps_weights[index]
    }

    pub fn set_vps_weight(&mut self, index: usize, weight: f32) {
        self.vps_weights[index] = weight;
    }

    /// World transform of the component.
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
    }

    /// Called after bone poses were written.
    pub fn invalidate_bones(&mut self) {
        self.bone_revision = self.bone_revision.wrapping_add(1);
    }

    pub fn invalidate_vps(&mut self) {
        self.vps_revision = self.vps_revision.wrapping_add(1);
    }

    pub fn bone_revision(&self) -> u64 {
        self.bone_revision
    }

    pub fn vps_revision(&self) -> u64 {
        self.vps_revision
    }

    /// Component-space matrix of a rig bone built from the current poses.
    pub fn bone_component_matrix(&self, index: usize) -> Mat4 {
        let Some(rig) = self.rig.as_ref() else {
            return Mat4::IDENTITY;
        };
        let mut matrix = Mat4::IDENTITY;
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            matrix = rig.bone(i).rest_matrix() * self.bones[i].matrix() * matrix;
            cursor = rig.bone(i).parent;
        }
        matrix
    }

    /// The task currently allowed to write this component. Finished handles are dropped on
    /// read, so a token that outlived its task never blocks anyone.
    pub fn animator_task(&mut self) -> Option<TaskHandle> {
        if self
            .animator_task
            .as_ref()
            .is_some_and(TaskHandle::is_finished)
        {
            self.animator_task = None;
        }
        self.animator_task.clone()
    }

    pub fn set_animator_task(&mut self, task: Option<TaskHandle>) {
        self.animator_task = task;
    }

    /// Release the writer token if it still belongs to task `id`.
    pub fn clear_animator_task_if(&mut self, id: TaskId) -> bool {
        if self.animator_task.as_ref().is_some_and(|t| t.id() == id) {
            self.animator_task = None;
            return true;
        }
        false
    }
}
