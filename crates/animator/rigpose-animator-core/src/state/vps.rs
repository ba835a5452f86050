//! Vertex position set (morph target) weights.

use crate::blend::{blend_weight, BlendMode};
use crate::component::Component;
use crate::error::Result;
use crate::rig::Model;

#[derive(Clone, Debug)]
pub struct VpsState {
    name: String,
    model_index: Option<usize>,
    weight: f32,
    last_weight: f32,
    dirty: bool,
}

impl VpsState {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_index(&self) -> Option<usize> {
        self.model_index
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Clone, Debug, Default)]
pub struct VpsStateList {
    states: Vec<VpsState>,
}

impl VpsStateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the model's VPS names, restricted to `filter` when it is non-empty.
    pub fn rebuild(&mut self, model: Option<&Model>, filter: &[String]) -> Result<()> {
        self.states.clear();
        let Some(model) = model else {
            return Ok(());
        };
        let names = &model.vertex_position_sets;
        self.states.try_reserve_exact(names.len())?;
        for (i, name) in names.iter().enumerate() {
            if !filter.is_empty() && !filter.contains(name) {
                continue;
            }
            self.states.push(VpsState {
                name: name.clone(),
                model_index: Some(i),
                weight: 0.0,
                last_weight: 0.0,
                dirty: true,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub fn state(&self, index: usize) -> &VpsState {
        &self.states[index]
    }

    pub fn weight(&self, index: usize) -> f32 {
        self.states[index].weight
    }

    pub fn last_weight(&self, index: usize) -> f32 {
        self.states[index].last_weight
    }

    pub fn set_weight(&mut self, index: usize, weight: f32) {
        let state = &mut self.states[index];
        state.weight = weight;
        state.dirty = true;
    }

    pub fn blend_weight(&mut self, index: usize, incoming: f32, mode: BlendMode, factor: f32) {
        let current = self.states[index].weight;
        let blended = blend_weight(current, incoming, mode, factor);
        if blended != current {
            self.set_weight(index, blended);
        }
    }

    pub fn reset_weights(&mut self) {
        for state in &mut self.states {
            state.weight = 0.0;
            state.dirty = true;
        }
    }

    pub fn copy_weights_from(&mut self, other: &VpsStateList) {
        assert_eq!(self.states.len(), other.states.len());
        for (dst, src) in self.states.iter_mut().zip(&other.states) {
            dst.weight = src.weight;
            dst.dirty = true;
        }
    }

    pub fn update_from_component(&mut self, component: &Component) {
        for state in &mut self.states {
            let weight = match state.model_index {
                Some(mi) if mi < component.vps_count() => component.vps_weight(mi),
                _ => 0.0,
            };
            state.weight = weight;
            state.last_weight = weight;
            state.dirty = false;
        }
    }

    pub fn apply_to_component(
        &mut self,
        component: &mut Component,
        blend: Option<(BlendMode, f32)>,
    ) {
        if self.states.is_empty() {
            return;
        }
        for state in &mut self.states {
            let Some(mi) = state.model_index else {
                continue;
            };
            if mi >= component.vps_count() {
                continue;
            }
            let weight = match blend {
                None => state.weight,
                Some((mode, factor)) => {
                    blend_weight(component.vps_weight(mi), state.weight, mode, factor)
                }
            };
            component.set_vps_weight(mi, weight);
            state.dirty = false;
        }
        component.invalidate_vps();
    }
}
