//! One node of the bone state graph.

use glam::Mat4;

use crate::blend::Pose;
use crate::rig::BoneIkLimits;

/// Working pose of a single bone plus cached matrices.
///
/// Parent and children are indices into the owning [`super::BoneStateList`].
#[derive(Clone, Debug)]
pub struct BoneState {
    pub(crate) name: String,
    pub(crate) rig_index: Option<usize>,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    pub(crate) pose: Pose,
    /// Pose read from the component at the start of the frame.
    pub(crate) last_pose: Pose,

    pub(crate) rig_local: Mat4,
    pub(crate) inverse_rig_local: Mat4,
    pub(crate) local: Mat4,
    pub(crate) inverse_local: Mat4,
    pub(crate) global: Mat4,
    pub(crate) inverse_global: Mat4,

    pub(crate) dirty: bool,
    pub(crate) protected: bool,
    pub(crate) ik_limits: BoneIkLimits,
}

impl BoneState {
    pub(crate) fn new(name: String, rig_index: Option<usize>, rig_local: Mat4) -> Self {
        Self {
            name,
            rig_index,
            parent: None,
            children: Vec::new(),
            pose: Pose::IDENTITY,
            last_pose: Pose::IDENTITY,
            rig_local,
            inverse_rig_local: rig_local.inverse(),
            local: Mat4::IDENTITY,
            inverse_local: Mat4::IDENTITY,
            global: rig_local,
            inverse_global: rig_local.inverse(),
            dirty: true,
            protected: false,
            ik_limits: BoneIkLimits::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rig_index(&self) -> Option<usize> {
        self.rig_index
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn last_pose(&self) -> &Pose {
        &self.last_pose
    }

    pub fn rig_local_matrix(&self) -> &Mat4 {
        &self.rig_local
    }

    pub fn inverse_rig_local_matrix(&self) -> &Mat4 {
        &self.inverse_rig_local
    }

    /// Cached matrices; only meaningful while `is_dirty()` is false.
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local
    }

    pub fn inverse_local_matrix(&self) -> &Mat4 {
        &self.inverse_local
    }

    pub fn global_matrix(&self) -> &Mat4 {
        &self.global
    }

    pub fn inverse_global_matrix(&self) -> &Mat4 {
        &self.inverse_global
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn ik_limits(&self) -> &BoneIkLimits {
        &self.ik_limits
    }
}
