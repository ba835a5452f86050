//! Animator descriptors: the shared, editable definition instances build their rules from.
//!
//! An [`Animator`] holds an immutable [`AnimatorDef`] behind an `Arc`. Editing swaps in a new
//! definition and bumps the revision, so instances notice on their next pass and rebuild, and a
//! task that already cloned the old `Arc` keeps evaluating a consistent snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::animation::AnimationTracks;
use crate::controller::Controller;
use crate::error::Result;
use crate::link::LinkDef;
use crate::rule::RuleDef;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimatorDef {
    pub name: String,
    pub controllers: Vec<Controller>,
    pub links: Vec<LinkDef>,
    pub rules: Vec<RuleDef>,
    /// Bones the animator works on; empty means the whole rig.
    pub bones: Vec<String>,
    /// Vertex position sets the animator works on; empty means all of the model's.
    pub vertex_position_sets: Vec<String>,
    /// Animation used when the instance does not set its own.
    #[serde(skip)]
    pub animation: Option<Arc<AnimationTracks>>,
}

impl AnimatorDef {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn controller_index(&self, name: &str) -> Option<usize> {
        self.controllers.iter().position(|c| c.name == name)
    }
}

#[derive(Debug)]
struct Revisioned {
    def: Arc<AnimatorDef>,
    revision: u64,
}

/// Shared animator resource. Cheap to read; every edit bumps [`Animator::revision`].
#[derive(Debug)]
pub struct Animator {
    inner: RwLock<Revisioned>,
}

impl Animator {
    pub fn new(def: AnimatorDef) -> Self {
        Self {
            inner: RwLock::new(Revisioned {
                def: Arc::new(def),
                revision: 1,
            }),
        }
    }

    pub fn shared(def: AnimatorDef) -> Arc<Self> {
        Arc::new(Self::new(def))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::new(AnimatorDef::from_json(text)?))
    }

    /// Current definition together with its revision.
    pub fn snapshot(&self) -> (Arc<AnimatorDef>, u64) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&inner.def), inner.revision)
    }

    pub fn definition(&self) -> Arc<AnimatorDef> {
        self.snapshot().0
    }

    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Edit the definition in place and bump the revision.
    pub fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut AnimatorDef),
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        edit(Arc::make_mut(&mut inner.def));
        inner.revision += 1;
        log::debug!(
            "animator '{}' changed, revision {}",
            inner.def.name,
            inner.revision
        );
    }

    pub fn set_animation(&self, animation: Option<Arc<AnimationTracks>>) {
        self.update(|def| def.animation = animation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_bump_revision() {
        let animator = Animator::new(AnimatorDef::default());
        let (before, rev) = animator.snapshot();
        animator.update(|def| def.name = "walk".into());
        assert_eq!(animator.revision(), rev + 1);
        assert!(before.name.is_empty());
        assert_eq!(animator.definition().name, "walk");
    }

    #[test]
    fn unknown_rule_types_deserialize() {
        let def = AnimatorDef::from_json(r#"{"rules":[{"type":"wobble"},{"type":"mirror"}]}"#)
            .unwrap();
        assert!(matches!(def.rules[0], RuleDef::Unknown));
        assert!(matches!(def.rules[1], RuleDef::Mirror(_)));
    }
}
