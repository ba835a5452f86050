//! Host-driven controllers and their per-frame normalized state.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::EPSILON;

/// A scalar input set by the host, with an auxiliary vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Controller {
    pub name: String,
    pub minimum: f32,
    pub maximum: f32,
    pub current: f32,
    pub vector: Vec3,
    /// Clamp values into `[minimum, maximum]`; wrap into the range otherwise.
    pub clamp: bool,
    /// Frozen controllers ignore `set_value` and `set_vector`.
    pub frozen: bool,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            name: String::new(),
            minimum: 0.0,
            maximum: 1.0,
            current: 0.0,
            vector: Vec3::ZERO,
            clamp: true,
            frozen: false,
        }
    }
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, minimum: f32, maximum: f32) -> Self {
        self.set_range(minimum, maximum);
        self
    }

    pub fn set_range(&mut self, minimum: f32, maximum: f32) {
        self.minimum = minimum;
        self.maximum = maximum;
        self.current = self.constrain(self.current);
    }

    pub fn set_value(&mut self, value: f32) {
        if self.frozen {
            return;
        }
        self.current = self.constrain(value);
    }

    pub fn set_vector(&mut self, vector: Vec3) {
        if self.frozen {
            return;
        }
        self.vector = vector;
    }

    /// `current` mapped into `[0,1]`; zero when the range is degenerate.
    pub fn normalized(&self) -> f32 {
        let range = self.maximum - self.minimum;
        if range.abs() < EPSILON {
            return 0.0;
        }
        ((self.current - self.minimum) / range).clamp(0.0, 1.0)
    }

    fn constrain(&self, value: f32) -> f32 {
        let lower = self.minimum.min(self.maximum);
        let upper = self.minimum.max(self.maximum);
        if self.clamp {
            return value.max(lower).min(upper);
        }
        let range = upper - lower;
        if range < EPSILON {
            return lower;
        }
        lower + (value - lower).rem_euclid(range)
    }
}

/// Normalized controller values for one frame, indexed like the instance's controllers.
#[derive(Clone, Debug, Default)]
pub struct ControllerStates {
    values: Vec<f32>,
    vectors: Vec<Vec3>,
}

impl ControllerStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_from(&mut self, controllers: &[Controller]) {
        self.values.clear();
        self.vectors.clear();
        self.values
            .extend(controllers.iter().map(Controller::normalized));
        self.vectors.extend(controllers.iter().map(|c| c.vector));
    }

    pub fn push(&mut self, value: f32, vector: Vec3) {
        self.values.push(value);
        self.vectors.push(vector);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> f32 {
        self.values[index]
    }

    pub fn vector(&self, index: usize) -> Vec3 {
        self.vectors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_controller_ignores_updates() {
        let mut c = Controller::new("c");
        c.set_value(0.4);
        c.frozen = true;
        c.set_value(0.9);
        assert_eq!(c.current, 0.4);
    }

    #[test]
    fn clamp_or_wrap_into_range() {
        let mut c = Controller::new("c").with_range(-1.0, 1.0);
        c.set_value(3.0);
        assert_eq!(c.current, 1.0);
        c.clamp = false;
        c.set_value(1.5);
        assert!((c.current - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn degenerate_range_normalizes_to_zero() {
        let mut c = Controller::new("c").with_range(2.0, 2.0 + 1e-6);
        c.current = 2.0;
        assert_eq!(c.normalized(), 0.0);
    }
}
