//! Compressed per frame bone samples.
//!
//! Each sample in the pool is 14 bytes: a rotation quaternion stored as four [u16] values
//! in scalar first order (`w`, `x`, `y`, `z`) followed by a translation stored as three [u16] values.
//! Samples are shared between frames and bones and addressed through the 3 byte frame index table.
use binrw::{BinRead, BinWrite};
use glam::{Quat, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::normalize_or_identity;

/// The size in bytes of a [CompressedBone].
pub const COMPRESSED_BONE_SIZE: usize = 14;

/// The size in bytes of a single frame index table entry.
pub const POOL_INDEX_SIZE: usize = 3;

/// The largest pool index that fits in a frame index table entry.
pub const MAX_POOL_INDEX: u32 = 0x00FF_FFFF;

const ROTATION_SCALE: f32 = 16383.0;
const ROTATION_OFFSET: f32 = 2.0;
const TRANSLATION_SCALE: f32 = 64.0;
const TRANSLATION_OFFSET: f32 = 512.0;

/// A quantized rotation and translation for one bone.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(little)]
pub struct CompressedBone {
    /// The raw `w`, `x`, `y`, `z` quaternion components.
    pub rotation: [u16; 4],
    /// The raw `x`, `y`, `z` translation components.
    pub translation: [u16; 3],
}

impl CompressedBone {
    /// The sample for an identity rotation and zero translation.
    pub const IDENTITY: Self = Self {
        rotation: [49149, 32766, 32766, 32766],
        translation: [32768, 32768, 32768],
    };

    /// Decodes the translation in model units and the normalized rotation.
    /**
    ```rust
    use gla_lib::compressed::CompressedBone;
    use glam::{Quat, Vec3};

    let (translation, rotation) = CompressedBone::IDENTITY.decompress();
    assert_eq!(Vec3::ZERO, translation);
    assert_eq!(Quat::IDENTITY, rotation);
    ```
    */
    pub fn decompress(&self) -> (Vec3, Quat) {
        let [w, x, y, z] = self.rotation.map(decompress_rotation_component);
        let rotation = normalize_or_identity(Quat::from_xyzw(x, y, z, w));

        let [tx, ty, tz] = self.translation.map(decompress_translation_component);
        (Vec3::new(tx, ty, tz), rotation)
    }

    /// Quantizes `translation` and `rotation` to the nearest representable values.
    /// Components outside the representable range are clamped.
    pub fn compress(translation: Vec3, rotation: Quat) -> Self {
        let rotation = normalize_or_identity(rotation);
        Self {
            rotation: [rotation.w, rotation.x, rotation.y, rotation.z]
                .map(compress_rotation_component),
            translation: translation.to_array().map(compress_translation_component),
        }
    }
}

fn decompress_rotation_component(raw: u16) -> f32 {
    raw as f32 / ROTATION_SCALE - ROTATION_OFFSET
}

fn decompress_translation_component(raw: u16) -> f32 {
    raw as f32 / TRANSLATION_SCALE - TRANSLATION_OFFSET
}

fn compress_rotation_component(value: f32) -> u16 {
    quantize((value + ROTATION_OFFSET) * ROTATION_SCALE)
}

fn compress_translation_component(value: f32) -> u16 {
    quantize((value + TRANSLATION_OFFSET) * TRANSLATION_SCALE)
}

fn quantize(value: f32) -> u16 {
    value.round().clamp(0.0, u16::MAX as f32) as u16
}

/// Decodes a little endian 24 bit pool index.
pub fn read_pool_index(bytes: [u8; POOL_INDEX_SIZE]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

/// Encodes the lower 24 bits of `index` in little endian order.
pub fn write_pool_index(index: u32) -> [u8; POOL_INDEX_SIZE] {
    let [b0, b1, b2, _] = index.to_le_bytes();
    [b0, b1, b2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use binrw::{BinReaderExt, BinWriterExt};
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn read_identity_sample() {
        let mut reader = Cursor::new(hex!("FDBF FE7F FE7F FE7F 0080 0080 0080"));
        let value: CompressedBone = reader.read_le().unwrap();
        assert_eq!(CompressedBone::IDENTITY, value);

        let (translation, rotation) = value.decompress();
        assert_relative_eq!(0.0, translation.x);
        assert_relative_eq!(0.0, translation.y);
        assert_relative_eq!(0.0, translation.z);
        assert_relative_eq!(0.0, rotation.x);
        assert_relative_eq!(0.0, rotation.y);
        assert_relative_eq!(0.0, rotation.z);
        assert_relative_eq!(1.0, rotation.w);
    }

    #[test]
    fn write_identity_sample() {
        let mut writer = Cursor::new(Vec::new());
        writer.write_le(&CompressedBone::IDENTITY).unwrap();
        assert_eq!(
            hex!("FDBF FE7F FE7F FE7F 0080 0080 0080").to_vec(),
            writer.into_inner()
        );
    }

    #[test]
    fn decompress_scalar_first_rotation() {
        // w = 0, x = 1 is a half turn around x.
        let value = CompressedBone {
            rotation: [32766, 49149, 32766, 32766],
            translation: [32768 + 64, 32768 - 128, 32768 + 32],
        };
        let (translation, rotation) = value.decompress();
        assert_eq!(Vec3::new(1.0, -2.0, 0.5), translation);
        assert_relative_eq!(1.0, rotation.x);
        assert_relative_eq!(0.0, rotation.w);
    }

    #[test]
    fn decompress_zero_rotation_is_identity() {
        let value = CompressedBone {
            rotation: [32766; 4],
            translation: [32768; 3],
        };
        assert_eq!(Quat::IDENTITY, value.decompress().1);
    }

    #[test]
    fn decompress_normalizes_rotation() {
        let value = CompressedBone {
            rotation: [65535, 65535, 32766, 32766],
            translation: [0; 3],
        };
        let (translation, rotation) = value.decompress();
        assert_relative_eq!(1.0, rotation.length(), epsilon = 1e-6);
        assert_eq!(Vec3::splat(-512.0), translation);
    }

    #[test]
    fn compress_decompress_sample() {
        let rotation = Quat::from_rotation_y(1.2);
        let value = CompressedBone::compress(Vec3::new(3.5, -7.25, 100.0), rotation);
        let (t, r) = value.decompress();
        assert_eq!(Vec3::new(3.5, -7.25, 100.0), t);
        assert!(r.abs_diff_eq(rotation, 1e-4));
    }

    #[test]
    fn pool_index_little_endian() {
        assert_eq!(0x030201, read_pool_index([1, 2, 3]));
        assert_eq!([0xFF, 0xFF, 0xFF], write_pool_index(MAX_POOL_INDEX));
    }
}
