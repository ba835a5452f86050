//! Small math helpers on top of glam.
//!
//! Euler angles are radians in `XYZ` order everywhere in this crate. Matrices follow glam's
//! column-vector convention, so a bone's component-space matrix is
//! `parent_global * rig_local * local`.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Tolerance for "is this factor zero/one" tests.
pub const EPSILON: f32 = 1e-5;

#[inline]
pub fn is_zero(v: f32) -> bool {
    v.abs() < EPSILON
}

#[inline]
pub fn is_one(v: f32) -> bool {
    (v - 1.0).abs() < EPSILON
}

#[inline]
pub fn quat_from_euler(euler: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z)
}

#[inline]
pub fn quat_to_euler(q: Quat) -> Vec3 {
    let (x, y, z) = q.to_euler(EulerRot::XYZ);
    Vec3::new(x, y, z)
}

/// Translation/rotation/scale into a matrix.
#[inline]
pub fn compose(position: Vec3, orientation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, orientation, position)
}

/// Inverse of [`compose`]; the rotation is renormalized.
#[inline]
pub fn decompose(m: &Mat4) -> (Vec3, Quat, Vec3) {
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    (translation, rotation.normalize(), scale)
}

#[inline]
pub fn position_of(m: &Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// Rotation part of `m` with scale removed.
pub fn rotation_of(m: &Mat4) -> Quat {
    decompose(m).1
}

/// Linear interpolation of euler angles; used where authored data interpolates per axis.
#[inline]
pub fn lerp_euler(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a + (b - a) * t
}

/// `v - floor(v)`; keeps results in `[0, 1)`.
#[inline]
pub fn wrap_unit(v: f32) -> f32 {
    v - v.floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_roundtrip_keeps_trs() {
        let rot = quat_from_euler(Vec3::new(0.3, -0.2, 1.1));
        let m = compose(Vec3::new(1.0, 2.0, 3.0), rot, Vec3::new(1.0, 2.0, 1.5));
        let (p, r, s) = decompose(&m);
        assert!((p - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
        assert!(r.dot(rot).abs() > 0.9999);
        assert!((s - Vec3::new(1.0, 2.0, 1.5)).length() < 1e-4);
    }

    #[test]
    fn euler_roundtrip_inside_gimbal_range() {
        let e = Vec3::new(0.4, 0.5, -0.6);
        let back = quat_to_euler(quat_from_euler(e));
        assert!((back - e).length() < 1e-4);
    }
}
