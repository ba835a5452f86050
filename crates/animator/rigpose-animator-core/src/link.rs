//! Links map controller values (or bone parameters) through a curve into rule parameters.
//!
//! A [`ControllerTarget`] is a rule parameter: a list of link indices whose values multiply.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerStates;
use crate::math::{quat_from_euler, quat_to_euler, wrap_unit, EPSILON};
use crate::state::BoneStateList;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveInterpolation {
    Constant,
    #[default]
    Linear,
    Bezier,
}

/// Control point; handles default to the point itself, which makes a bezier segment linear.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub point: Vec2,
    #[serde(default)]
    pub handle_in: Option<Vec2>,
    #[serde(default)]
    pub handle_out: Option<Vec2>,
}

impl CurvePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            point: Vec2::new(x, y),
            handle_in: None,
            handle_out: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Curve {
    pub interpolation: CurveInterpolation,
    /// Sorted by `point.x`.
    pub points: Vec<CurvePoint>,
}

impl Curve {
    pub fn linear(points: Vec<CurvePoint>) -> Self {
        Self {
            interpolation: CurveInterpolation::Linear,
            points,
        }
    }

    /// `y` at `x`; identity without points, clamped to the end points outside them.
    pub fn evaluate(&self, x: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return x;
        };
        if x <= first.point.x {
            return first.point.y;
        }
        if x >= last.point.x {
            return last.point.y;
        }

        let next = self.points.partition_point(|p| p.point.x <= x);
        let a = &self.points[next - 1];
        let b = &self.points[next];
        let width = b.point.x - a.point.x;
        if width < EPSILON {
            return a.point.y;
        }

        match self.interpolation {
            CurveInterpolation::Constant => a.point.y,
            CurveInterpolation::Linear => {
                let t = (x - a.point.x) / width;
                a.point.y + (b.point.y - a.point.y) * t
            }
            CurveInterpolation::Bezier => {
                let p0 = a.point;
                let p1 = a.handle_out.unwrap_or(a.point);
                let p2 = b.handle_in.unwrap_or(b.point);
                let p3 = b.point;
                let t = solve_bezier_t(x, p0.x, p1.x, p2.x, p3.x);
                cubic_bezier(p0.y, p1.y, p2.y, p3.y, t)
            }
        }
    }
}

#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

#[inline]
fn cubic_bezier_derivative(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    3.0 * u * u * (p1 - p0) + 6.0 * u * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
}

/// Parameter `t` at which the bezier's x equals `x`: Newton first, bisection if it wanders.
fn solve_bezier_t(x: f32, x0: f32, x1: f32, x2: f32, x3: f32) -> f32 {
    let mut t = ((x - x0) / (x3 - x0)).clamp(0.0, 1.0);
    for _ in 0..8 {
        let err = cubic_bezier(x0, x1, x2, x3, t) - x;
        if err.abs() < 1e-6 {
            return t;
        }
        let slope = cubic_bezier_derivative(x0, x1, x2, x3, t);
        if slope.abs() < 1e-6 {
            break;
        }
        t -= err / slope;
        if !(0.0..=1.0).contains(&t) {
            break;
        }
    }

    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = 0.5;
    for _ in 0..32 {
        mid = 0.5 * (lo + hi);
        let v = cubic_bezier(x0, x1, x2, x3, mid);
        if (v - x).abs() < 1e-6 {
            break;
        }
        if v < x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    mid
}

/// Bone pose component a link can read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoneParameter {
    PositionX,
    PositionY,
    PositionZ,
    #[default]
    RotationX,
    RotationY,
    RotationZ,
    ScaleX,
    ScaleY,
    ScaleZ,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkDef {
    /// Index into the animator's controllers.
    pub controller: Option<usize>,
    pub curve: Curve,
    pub repeat: u32,
    /// Bone read instead of a controller.
    pub bone: Option<String>,
    pub bone_parameter: BoneParameter,
    pub bone_minimum: f32,
    pub bone_maximum: f32,
    /// Wrap the curve output into `[0,1)`.
    pub wrap_y: bool,
}

impl Default for LinkDef {
    fn default() -> Self {
        Self {
            controller: None,
            curve: Curve::default(),
            repeat: 1,
            bone: None,
            bone_parameter: BoneParameter::default(),
            bone_minimum: 0.0,
            bone_maximum: 1.0,
            wrap_y: false,
        }
    }
}

impl LinkDef {
    pub fn controller(index: usize) -> Self {
        Self {
            controller: Some(index),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    controller: Option<usize>,
    curve: Curve,
    repeat: u32,
    bone_name: Option<String>,
    bone: Option<usize>,
    bone_parameter: BoneParameter,
    bone_minimum: f32,
    bone_maximum: f32,
    bone_value: f32,
    wrap_y: bool,
}

impl Link {
    /// Build from a descriptor; `controller_map` translates descriptor controller indices into
    /// indices of the evaluated [`ControllerStates`].
    pub fn new(def: &LinkDef, controller_map: &[Option<usize>]) -> Self {
        let controller = def
            .controller
            .and_then(|c| controller_map.get(c).copied().flatten());
        Self {
            controller,
            curve: def.curve.clone(),
            repeat: def.repeat,
            bone_name: def.bone.clone(),
            bone: None,
            bone_parameter: def.bone_parameter,
            bone_minimum: def.bone_minimum,
            bone_maximum: def.bone_maximum,
            bone_value: 0.0,
            wrap_y: def.wrap_y,
        }
    }

    pub fn controller(&self) -> Option<usize> {
        self.controller
    }

    pub fn bone(&self) -> Option<usize> {
        self.bone
    }

    pub fn is_bound(&self, states: &ControllerStates) -> bool {
        self.bone.is_some() || self.controller.is_some_and(|c| c < states.len())
    }

    /// Resolve the source bone name against a rebuilt state list.
    pub fn resolve_bone(&mut self, bones: &BoneStateList) {
        self.bone = self.bone_name.as_deref().and_then(|n| bones.index_of(n));
    }

    /// Sample the source bone; called at the start of every rule pass.
    pub fn update_bone_value(&mut self, bones: &BoneStateList) {
        let Some(bone) = self.bone else {
            return;
        };
        let pose = bones.pose(bone);
        let raw = match self.bone_parameter {
            BoneParameter::PositionX => pose.position.x,
            BoneParameter::PositionY => pose.position.y,
            BoneParameter::PositionZ => pose.position.z,
            BoneParameter::RotationX => quat_to_euler(pose.orientation).x,
            BoneParameter::RotationY => quat_to_euler(pose.orientation).y,
            BoneParameter::RotationZ => quat_to_euler(pose.orientation).z,
            BoneParameter::ScaleX => pose.scale.x,
            BoneParameter::ScaleY => pose.scale.y,
            BoneParameter::ScaleZ => pose.scale.z,
        };
        let range = self.bone_maximum - self.bone_minimum;
        self.bone_value = if range.abs() < EPSILON {
            0.0
        } else {
            ((raw - self.bone_minimum) / range).clamp(0.0, 1.0)
        };
    }

    pub fn evaluate(&self, states: &ControllerStates, default: f32) -> f32 {
        let value = if self.bone.is_some() {
            self.bone_value
        } else {
            match self.controller.filter(|&c| c < states.len()) {
                Some(c) => states.value(c),
                None => return default,
            }
        };
        let value = if self.repeat > 1 {
            wrap_unit(value * self.repeat as f32)
        } else {
            value
        };
        let value = self.curve.evaluate(value);
        if self.wrap_y {
            wrap_unit(value)
        } else {
            value
        }
    }
}

/// Rule parameter driven by links. Empty or unbound targets return the caller's default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerTarget {
    /// Indices into the animator's links.
    pub links: Vec<usize>,
}

impl ControllerTarget {
    pub fn new(links: Vec<usize>) -> Self {
        Self { links }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn bound<'a>(
        &'a self,
        links: &'a [Link],
        states: &'a ControllerStates,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter_map(move |&l| links.get(l))
            .filter(move |link| link.is_bound(states))
    }

    /// Product of all bound links.
    pub fn value(&self, links: &[Link], states: &ControllerStates, default: f32) -> f32 {
        self.bound(links, states)
            .map(|link| link.evaluate(states, default))
            .reduce(|acc, v| acc * v)
            .unwrap_or(default)
    }

    /// Vector of the first link bound to a controller.
    pub fn vector(&self, links: &[Link], states: &ControllerStates, default: Vec3) -> Vec3 {
        self.bound(links, states)
            .find_map(|link| link.controller().filter(|&c| c < states.len()))
            .map_or(default, |c| states.vector(c))
    }

    /// [`Self::vector`] read as Euler angles in radians.
    pub fn quaternion(&self, links: &[Link], states: &ControllerStates, default: Quat) -> Quat {
        self.bound(links, states)
            .find_map(|link| link.controller().filter(|&c| c < states.len()))
            .map_or(default, |c| quat_from_euler(states.vector(c)))
    }
}
