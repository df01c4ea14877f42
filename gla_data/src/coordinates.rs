//! Conversions from the GLA Z-up coordinate system to the Y-up output coordinate system.
//!
//! The old +Z axis becomes +Y and the old +Y axis becomes -Z.
//! Positions are also converted from inches to meters.
//! The conversion is one directional and only applied while decoding.
use glam::{Quat, Vec3};

pub use gla_lib::math::normalize_or_identity as normalize_quaternion;
use gla_lib::Transform;

/// The scale from GLA units (inches) to meters.
pub const SCALE_FACTOR: f32 = 0.0254;

/// Converts a GLA position to the output coordinate system and units.
/**
```rust
use gla_data::coordinates::{convert_position, SCALE_FACTOR};
use glam::Vec3;

let p = convert_position(Vec3::new(1.0, 2.0, 3.0));
assert_eq!(Vec3::new(SCALE_FACTOR, 3.0 * SCALE_FACTOR, -2.0 * SCALE_FACTOR), p);
```
 */
pub fn convert_position(v: Vec3) -> Vec3 {
    convert_position_unscaled(v) * SCALE_FACTOR
}

/// Converts a GLA direction or offset to the output coordinate system without changing units.
pub fn convert_position_unscaled(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Converts a GLA rotation to the output coordinate system.
/// The result is not normalized.
pub fn convert_quaternion(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, q.z, -q.y, q.w)
}

/// Converts a GLA translation and rotation to the output coordinate system with unit scale.
pub fn convert_transform(translation: Vec3, rotation: Quat) -> Transform {
    Transform::new(
        convert_position(translation),
        normalize_quaternion(convert_quaternion(rotation)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gla_lib::math::rotate_vector;

    #[test]
    fn convert_position_axes() {
        let p = convert_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(1.0 * SCALE_FACTOR, p.x);
        assert_eq!(3.0 * SCALE_FACTOR, p.y);
        assert_eq!(-2.0 * SCALE_FACTOR, p.z);
    }

    #[test]
    fn convert_position_unscaled_axes() {
        assert_eq!(
            Vec3::new(1.0, 3.0, -2.0),
            convert_position_unscaled(Vec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn convert_quaternion_components() {
        let q = convert_quaternion(Quat::from_xyzw(0.1, 0.2, 0.3, 0.4));
        assert_eq!(Quat::from_xyzw(0.1, 0.3, -0.2, 0.4), q);
    }

    #[test]
    fn convert_quaternion_is_not_an_involution() {
        let q = Quat::from_xyzw(0.1, 0.2, 0.3, 0.4);
        assert_ne!(q, convert_quaternion(convert_quaternion(q)));
    }

    #[test]
    fn converted_rotation_matches_converted_vectors() {
        // Rotating then converting should match converting then rotating.
        let q = Quat::from_rotation_z(0.6) * Quat::from_rotation_x(-1.1);
        let v = Vec3::new(0.5, -2.0, 1.5);

        let expected = convert_position_unscaled(rotate_vector(q, v));
        let actual = rotate_vector(convert_quaternion(q), convert_position_unscaled(v));
        assert_relative_eq!(expected.x, actual.x, epsilon = 1e-5);
        assert_relative_eq!(expected.y, actual.y, epsilon = 1e-5);
        assert_relative_eq!(expected.z, actual.z, epsilon = 1e-5);
    }

    #[test]
    fn normalize_degenerate_quaternion() {
        assert_eq!(
            Quat::IDENTITY,
            normalize_quaternion(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0))
        );
    }

    #[test]
    fn convert_transform_unit_scale() {
        let t = convert_transform(Vec3::new(0.0, 10.0, 0.0), Quat::from_xyzw(0.0, 0.0, 0.0, 2.0));
        assert_eq!(Vec3::ONE, t.scale);
        assert_eq!(Quat::IDENTITY, t.rotation);
        assert_eq!(Vec3::new(0.0, 0.0, -10.0 * SCALE_FACTOR), t.translation);
    }
}
