use binrw::{BinRead, BinWrite};
use glam::{Affine3A, Mat3A, Quat, Vec3, Vec3A};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::{normalize_or_identity, Transform};

/// Columns shorter than this are treated as degenerate when decomposing.
pub const MIN_AXIS_LENGTH: f32 = 1e-6;

/// A row-major 3x4 affine matrix of contiguous floats.
/// The last column stores the translation and the implied fourth row is `[0, 0, 0, 1]`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, BinWrite, Debug, PartialEq, Clone, Copy)]
#[brw(little)]
pub struct Matrix3x4 {
    pub rows: [[f32; 4]; 3],
}

impl Matrix3x4 {
    /// The identity transformation matrix.
    ///
    /**
    ```rust
    use gla_lib::Matrix3x4;

    let m = Matrix3x4::IDENTITY;
    assert_eq!([1.0, 0.0, 0.0, 0.0], m.rows[0]);
    assert_eq!([0.0, 1.0, 0.0, 0.0], m.rows[1]);
    assert_eq!([0.0, 0.0, 1.0, 0.0], m.rows[2]);
    ```
    */
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// Builds the matrix for rotating by `rotation` and then translating by `translation`.
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self::from_affine(&Affine3A::from_rotation_translation(rotation, translation))
    }

    pub fn from_affine(matrix: &Affine3A) -> Self {
        let x = matrix.matrix3.x_axis;
        let y = matrix.matrix3.y_axis;
        let z = matrix.matrix3.z_axis;
        let t = matrix.translation;
        Self {
            rows: [
                [x.x, y.x, z.x, t.x],
                [x.y, y.y, z.y, t.y],
                [x.z, y.z, z.z, t.z],
            ],
        }
    }

    pub fn to_affine(&self) -> Affine3A {
        let [r0, r1, r2] = self.rows;
        Affine3A {
            matrix3: Mat3A::from_cols(
                Vec3A::new(r0[0], r1[0], r2[0]),
                Vec3A::new(r0[1], r1[1], r2[1]),
                Vec3A::new(r0[2], r1[2], r2[2]),
            ),
            translation: Vec3A::new(r0[3], r1[3], r2[3]),
        }
    }

    /// The last column of the matrix.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.rows[0][3], self.rows[1][3], self.rows[2][3])
    }

    /// Decomposes the matrix into translation, rotation, and per axis scale.
    /// See [decompose_affine].
    pub fn decompose(&self) -> Transform {
        decompose_affine(&self.to_affine())
    }

    /// The inverse affine transformation.
    pub fn inverse(&self) -> Self {
        Self::from_affine(&self.to_affine().inverse())
    }
}

/// Splits `matrix` into translation, rotation, and scale.
///
/// The scale for each axis is the length of the corresponding column.
/// Columns shorter than [MIN_AXIS_LENGTH] are replaced by the identity axis with unit scale,
/// so degenerate matrices still produce a valid rotation.
pub fn decompose_affine(matrix: &Affine3A) -> Transform {
    let columns = [
        Vec3::from(matrix.matrix3.x_axis),
        Vec3::from(matrix.matrix3.y_axis),
        Vec3::from(matrix.matrix3.z_axis),
    ];
    let identity_axes = [Vec3::X, Vec3::Y, Vec3::Z];

    let mut scale = [1.0; 3];
    let mut axes = identity_axes;
    for i in 0..3 {
        let length = columns[i].length();
        if length > MIN_AXIS_LENGTH {
            scale[i] = length;
            axes[i] = columns[i] / length;
        }
    }

    Transform {
        translation: Vec3::from(matrix.translation),
        rotation: rotation_from_axes(axes),
        scale: Vec3::from(scale),
    }
}

/// Converts an orthonormal basis given as columns to a normalized quaternion.
///
/// The branch is chosen from the trace and the largest diagonal element
/// to avoid dividing by values near zero for rotations close to 180 degrees.
fn rotation_from_axes([c0, c1, c2]: [Vec3; 3]) -> Quat {
    let (m00, m10, m20) = (c0.x, c0.y, c0.z);
    let (m01, m11, m21) = (c1.x, c1.y, c1.z);
    let (m02, m12, m22) = (c2.x, c2.y, c2.z);

    let trace = m00 + m11 + m22;
    let q = if trace > 0.0 {
        let s = 0.5 / (trace + 1.0).sqrt();
        Quat::from_xyzw(
            (m21 - m12) * s,
            (m02 - m20) * s,
            (m10 - m01) * s,
            0.25 / s,
        )
    } else if m00 > m11 && m00 > m22 {
        let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
        Quat::from_xyzw(
            0.25 * s,
            (m01 + m10) / s,
            (m02 + m20) / s,
            (m21 - m12) / s,
        )
    } else if m11 > m22 {
        let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
        Quat::from_xyzw(
            (m01 + m10) / s,
            0.25 * s,
            (m12 + m21) / s,
            (m02 - m20) / s,
        )
    } else {
        let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
        Quat::from_xyzw(
            (m02 + m20) / s,
            (m12 + m21) / s,
            0.25 * s,
            (m10 - m01) / s,
        )
    };

    normalize_or_identity(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use binrw::BinReaderExt;
    use hexlit::hex;
    use std::io::Cursor;

    fn assert_rotation_eq(expected: Quat, actual: Quat) {
        // q and -q represent the same rotation.
        let actual = if expected.dot(actual) < 0.0 {
            -actual
        } else {
            actual
        };
        assert_relative_eq!(expected.x, actual.x, epsilon = 1e-5);
        assert_relative_eq!(expected.y, actual.y, epsilon = 1e-5);
        assert_relative_eq!(expected.z, actual.z, epsilon = 1e-5);
        assert_relative_eq!(expected.w, actual.w, epsilon = 1e-5);
    }

    #[test]
    fn read_matrix_row_major() {
        let mut reader = Cursor::new(hex!(
            "0000803F 00000000 00000000 00002041 00000000 0000803F 00000000 0000A0C0 00000000 00000000 0000803F 00000040"
        ));
        let m: Matrix3x4 = reader.read_le().unwrap();
        assert_eq!(Vec3::new(10.0, -5.0, 2.0), m.translation());
        assert_eq!([1.0, 0.0, 0.0, 10.0], m.rows[0]);
    }

    #[test]
    fn decompose_identity() {
        let t = Matrix3x4::IDENTITY.decompose();
        assert_eq!(Vec3::ZERO, t.translation);
        assert_eq!(Quat::IDENTITY, t.rotation);
        assert_eq!(Vec3::ONE, t.scale);
    }

    #[test]
    fn decompose_rotation_translation() {
        let rotation = Quat::from_rotation_y(0.75);
        let m = Matrix3x4::from_rotation_translation(rotation, Vec3::new(1.0, 2.0, 3.0));
        let t = m.decompose();
        assert_rotation_eq(rotation, t.rotation);
        assert_eq!(Vec3::new(1.0, 2.0, 3.0), t.translation);
        assert_relative_eq!(1.0, t.scale.x, epsilon = 1e-6);
    }

    #[test]
    fn decompose_near_half_turn() {
        // Each off diagonal branch is selected by a different axis.
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let rotation = Quat::from_axis_angle(axis, 3.1);
            let t = Matrix3x4::from_rotation_translation(rotation, Vec3::ZERO).decompose();
            assert_rotation_eq(rotation, t.rotation);
        }
    }

    #[test]
    fn decompose_scaled_columns() {
        let m = Matrix3x4 {
            rows: [
                [2.0, 0.0, 0.0, 0.0],
                [0.0, 3.0, 0.0, 0.0],
                [0.0, 0.0, 4.0, 0.0],
            ],
        };
        let t = m.decompose();
        assert_eq!(Vec3::new(2.0, 3.0, 4.0), t.scale);
        assert_eq!(Quat::IDENTITY, t.rotation);
    }

    #[test]
    fn decompose_zero_matrix() {
        let m = Matrix3x4 {
            rows: [[0.0; 4]; 3],
        };
        let t = m.decompose();
        assert_eq!(Quat::IDENTITY, t.rotation);
        assert_eq!(Vec3::ONE, t.scale);
    }

    #[test]
    fn inverse_undoes_transform() {
        let m = Matrix3x4::from_rotation_translation(
            Quat::from_rotation_z(0.3),
            Vec3::new(4.0, -1.0, 0.5),
        );
        let product = m.to_affine() * m.inverse().to_affine();
        let t = decompose_affine(&product);
        assert_relative_eq!(0.0, t.translation.length(), epsilon = 1e-5);
        assert_rotation_eq(Quat::IDENTITY, t.rotation);
    }
}
