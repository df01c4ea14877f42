//! Quaternion and transform primitives shared by the GLA decoder and the retargeter.
//!
//! Quaternions are stored scalar last as [glam::Quat] (`x`, `y`, `z`, `w`).
//! The GLA format stores compressed rotations scalar first, which is handled
//! once while decompressing samples in [crate::compressed].
//!
//! Products use the Hamilton convention, so `multiply(a, b)` applies `b` first and then `a`.
//! This matches composing a parent's rotation `a` with a child's local rotation `b`.
use glam::{Quat, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quaternions with a squared length below this value normalize to [Quat::IDENTITY].
pub const DEGENERATE_LENGTH_SQUARED: f32 = 1e-10;

/// Combined rotations are only renormalized when their length exceeds this value.
pub const COMBINE_MIN_LENGTH: f32 = 1e-4;

/// Rotation axes are only normalized when their length exceeds this value.
pub const AXIS_MIN_LENGTH: f32 = 1e-4;

/// A translation, rotation, and scale applied in the order scale, rotation, translation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Creates a transform with unit scale.
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The Hamilton product `a * b`.
/**
```rust
use gla_lib::math::multiply;
use glam::Quat;

let a = Quat::from_rotation_z(0.5);
let b = Quat::from_rotation_x(0.25);
assert!(multiply(a, b).abs_diff_eq(a * b, 1e-6));
```
 */
pub fn multiply(a: Quat, b: Quat) -> Quat {
    Quat::from_xyzw(
        a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
    )
}

/// The inverse rotation for a unit quaternion.
pub fn conjugate(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, -q.y, -q.z, q.w)
}

/// Normalizes `q` or returns [Quat::IDENTITY] if `q` is numerically zero.
pub fn normalize_or_identity(q: Quat) -> Quat {
    let length_squared = q.length_squared();
    if length_squared < DEGENERATE_LENGTH_SQUARED {
        Quat::IDENTITY
    } else {
        let length = length_squared.sqrt();
        Quat::from_xyzw(q.x / length, q.y / length, q.z / length, q.w / length)
    }
}

/// Rotates `v` by the unit quaternion `q` as `q * v * conjugate(q)`.
pub fn rotate_vector(q: Quat, v: Vec3) -> Vec3 {
    let p = Quat::from_xyzw(v.x, v.y, v.z, 0.0);
    let r = multiply(multiply(q, p), conjugate(q));
    Vec3::new(r.x, r.y, r.z)
}

/// Multiplies `rotations` in order as `r0 * r1 * ... * rn`.
/// The result is normalized unless it is too close to zero.
/// Returns [Quat::IDENTITY] for an empty slice.
pub fn combine_rotations(rotations: &[Quat]) -> Quat {
    let Some((first, rest)) = rotations.split_first() else {
        return Quat::IDENTITY;
    };

    let result = rest.iter().fold(*first, |acc, r| multiply(acc, *r));
    let length = result.length();
    if length > COMBINE_MIN_LENGTH {
        Quat::from_xyzw(
            result.x / length,
            result.y / length,
            result.z / length,
            result.w / length,
        )
    } else {
        result
    }
}

/// Creates a rotation of `degrees` around `axis`.
/// The axis is normalized unless it is too close to zero.
pub fn from_axis_angle_degrees(degrees: f32, axis: Vec3) -> Quat {
    let length = axis.length();
    let axis = if length > AXIS_MIN_LENGTH {
        axis / length
    } else {
        axis
    };

    let half_angle = degrees.to_radians() / 2.0;
    let s = half_angle.sin();
    Quat::from_xyzw(axis.x * s, axis.y * s, axis.z * s, half_angle.cos())
}

/// Expresses a world space child transform relative to its parent's world space transform.
/// Returns the local translation and normalized local rotation.
pub fn world_to_local(
    parent_translation: Vec3,
    parent_rotation: Quat,
    translation: Vec3,
    rotation: Quat,
) -> (Vec3, Quat) {
    let inverse_parent = conjugate(parent_rotation);
    let local_rotation = normalize_or_identity(multiply(inverse_parent, rotation));
    let local_translation = rotate_vector(inverse_parent, translation - parent_translation);
    (local_translation, local_rotation)
}
