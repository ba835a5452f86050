//! Skeleton and model descriptors supplied by the asset provider.

use glam::{Mat4, Vec3};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::math::{compose, quat_from_euler};

/// Per-axis IK metadata of a rig bone.
///
/// An axis is locked when flagged, limited when `lower < upper`, and free otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoneIkLimits {
    /// Euler XYZ, radians.
    pub lower: Vec3,
    pub upper: Vec3,
    /// `[0,1]` per axis; turned into a damping multiplier `1 - resistance`.
    pub resistance: Vec3,
    pub locked: [bool; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigBone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    /// Rest position relative to the parent.
    #[serde(default)]
    pub position: Vec3,
    /// Rest rotation relative to the parent, Euler XYZ radians.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub ik_limits: BoneIkLimits,
    /// Driven by something else (physics); protected from write-back when requested.
    #[serde(default)]
    pub dynamic: bool,
}

impl RigBone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            position,
            rotation: Vec3::ZERO,
            ik_limits: BoneIkLimits::default(),
            dynamic: false,
        }
    }

    /// Rest transform relative to the parent bone.
    pub fn rest_matrix(&self) -> Mat4 {
        compose(self.position, quat_from_euler(self.rotation), Vec3::ONE)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rig {
    pub bones: Vec<RigBone>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,
}

impl Rig {
    pub fn new(bones: Vec<RigBone>) -> Self {
        let mut rig = Self {
            bones,
            lookup: HashMap::new(),
        };
        rig.reindex();
        rig
    }

    /// Rebuild the name lookup; call after deserializing or editing `bones`.
    pub fn reindex(&mut self) {
        self.lookup = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        if self.lookup.len() == self.bones.len() {
            return self.lookup.get(name).copied();
        }
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn bone(&self, index: usize) -> &RigBone {
        &self.bones[index]
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

/// Model data the core needs: the names of its vertex position sets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub vertex_position_sets: Vec<String>,
}

impl Model {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vertex_position_sets: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vertex_position_sets.iter().position(|n| n == name)
    }
}
