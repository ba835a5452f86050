//! The blend accumulator: how a rule's output is combined with the state already in the graph.
//!
//! Every rule funnels its result through [`blend_pose`] / [`blend_weight`], so the zero/one
//! short-circuits live here and nowhere else.
//! - `Blend`: factor 0 keeps `current`, factor 1 takes `incoming`, otherwise lerp/slerp/lerp.
//! - `Overlay`: additive; position and scale deltas are added, rotation is right-multiplied.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::{compose, decompose, is_one, is_zero};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    #[default]
    Blend,
    Overlay,
}

/// Which pose channels a blend may touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelMask {
    pub position: bool,
    pub orientation: bool,
    pub size: bool,
}

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask {
        position: true,
        orientation: true,
        size: true,
    };
    pub const NONE: ChannelMask = ChannelMask {
        position: false,
        orientation: false,
        size: false,
    };
    pub const ORIENTATION: ChannelMask = ChannelMask {
        position: false,
        orientation: true,
        size: false,
    };
    pub const POSITION: ChannelMask = ChannelMask {
        position: true,
        orientation: false,
        size: false,
    };
    pub const POSITION_ORIENTATION: ChannelMask = ChannelMask {
        position: true,
        orientation: true,
        size: false,
    };

    pub fn new(position: bool, orientation: bool, size: bool) -> Self {
        Self {
            position,
            orientation,
            size,
        }
    }

    pub fn any(&self) -> bool {
        self.position || self.orientation || self.size
    }

    pub fn is_all(&self) -> bool {
        self.position && self.orientation && self.size
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        ChannelMask::ALL
    }
}

/// A bone pose relative to the bone's rest (rig-local) transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, orientation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            orientation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        compose(self.position, self.orientation, self.scale)
    }

    pub fn from_matrix(m: &Mat4) -> Self {
        let (position, orientation, scale) = decompose(m);
        Self {
            position,
            orientation,
            scale,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::IDENTITY
    }
}

/// Slerp taking the shortest arc; nearly parallel inputs fall back to normalized lerp.
pub fn slerp_shortest(a: Quat, b: Quat, t: f32) -> Quat {
    let qa = a.normalize();
    let mut qb = b.normalize();

    let mut dot = qa.dot(qb);
    if dot < 0.0 {
        qb = -qb;
        dot = -dot;
    }

    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return (qa + (qb - qa) * t).normalize();
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;
    qa * s0 + qb * s1
}

/// Combine `incoming` into `current`.
pub fn blend_pose(
    current: &Pose,
    incoming: &Pose,
    mode: BlendMode,
    factor: f32,
    mask: ChannelMask,
) -> Pose {
    if is_zero(factor) || !mask.any() {
        return *current;
    }

    let mut out = *current;
    match mode {
        BlendMode::Blend => {
            if is_one(factor) {
                if mask.position {
                    out.position = incoming.position;
                }
                if mask.orientation {
                    out.orientation = incoming.orientation;
                }
                if mask.size {
                    out.scale = incoming.scale;
                }
            } else {
                if mask.position {
                    out.position = current.position.lerp(incoming.position, factor);
                }
                if mask.orientation {
                    out.orientation =
                        slerp_shortest(current.orientation, incoming.orientation, factor);
                }
                if mask.size {
                    out.scale = current.scale.lerp(incoming.scale, factor);
                }
            }
        }
        BlendMode::Overlay => {
            if mask.position {
                out.position = current.position + incoming.position * factor;
            }
            if mask.orientation {
                out.orientation = (current.orientation
                    * slerp_shortest(Quat::IDENTITY, incoming.orientation, factor))
                .normalize();
            }
            if mask.size {
                out.scale = current.scale + (incoming.scale - Vec3::ONE) * factor;
            }
        }
    }
    out
}

/// The overlay increment that carries `current` onto `target`, channel by channel, in the
/// same frame [`blend_pose`] adds it in.
pub fn overlay_delta(current: &Pose, target: &Pose) -> Pose {
    Pose {
        position: target.position - current.position,
        orientation: (current.orientation.inverse() * target.orientation).normalize(),
        scale: Vec3::ONE + (target.scale - current.scale),
    }
}

/// Scalar counterpart of [`blend_pose`] for morph weights.
pub fn blend_weight(current: f32, incoming: f32, mode: BlendMode, factor: f32) -> f32 {
    if is_zero(factor) {
        return current;
    }
    match mode {
        BlendMode::Blend => {
            if is_one(factor) {
                incoming
            } else {
                current + (incoming - current) * factor
            }
        }
        BlendMode::Overlay => current + incoming * factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::quat_from_euler;

    #[test]
    fn masked_channels_are_left_alone() {
        let current = Pose::new(Vec3::X, Quat::IDENTITY, Vec3::ONE);
        let incoming = Pose::new(Vec3::Y, quat_from_euler(Vec3::new(0.0, 1.0, 0.0)), Vec3::splat(2.0));
        let mask = ChannelMask {
            position: false,
            orientation: true,
            size: false,
        };
        let out = blend_pose(&current, &incoming, BlendMode::Blend, 1.0, mask);
        assert_eq!(out.position, current.position);
        assert_eq!(out.scale, current.scale);
        assert_eq!(out.orientation, incoming.orientation);
    }

    #[test]
    fn slerp_takes_short_arc() {
        let a = Quat::IDENTITY;
        let b = -quat_from_euler(Vec3::new(0.0, 0.2, 0.0));
        let mid = slerp_shortest(a, b, 0.5);
        assert!(mid.angle_between(a) < 0.11);
    }

    #[test]
    fn overlay_delta_lands_on_target_for_rotated_pose() {
        let current = Pose::new(
            Vec3::new(2.0, 0.0, 0.0),
            quat_from_euler(Vec3::new(0.0, 0.0, std::f32::consts::FRAC_PI_2)),
            Vec3::new(1.0, 2.0, 1.0),
        );
        let target = Pose::new(
            Vec3::new(1.0, 0.5, 0.0),
            quat_from_euler(Vec3::new(0.3, 0.0, 0.2)),
            Vec3::new(0.5, 1.0, 3.0),
        );
        let delta = overlay_delta(&current, &target);
        let out = blend_pose(&current, &delta, BlendMode::Overlay, 1.0, ChannelMask::ALL);
        assert!((out.position - target.position).length() < 1e-5);
        assert!(out.orientation.angle_between(target.orientation) < 1e-4);
        assert!((out.scale - target.scale).length() < 1e-5);
    }

    #[test]
    fn weight_overlay_adds() {
        assert_eq!(blend_weight(0.25, 0.5, BlendMode::Overlay, 0.5), 0.5);
        assert_eq!(blend_weight(0.25, 0.5, BlendMode::Overlay, 0.0), 0.25);
    }
}
