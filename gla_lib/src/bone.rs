use binrw::{BinRead, BinWrite};
use modular_bitfield::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{GlaName, Matrix3x4};

/// The size in bytes of a [GlaBone] without its child indices.
pub const BONE_HEADER_SIZE: usize = 172;

#[bitfield(bits = 32)]
#[repr(u32)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneFlags {
    /// The bone is always transformed even when it has no weighted vertices.
    pub always_transform: bool,
    #[skip]
    __: B31,
}

/// A named bone in the skeleton with its bind pose.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
#[brw(little)]
pub struct GlaBone {
    pub name: GlaName,
    #[br(map = |x: u32| BoneFlags::from(x))]
    #[bw(map = |x: &BoneFlags| u32::from(*x))]
    pub flags: BoneFlags,
    /// The index of the parent bone or `-1` if there is no parent.
    pub parent: i32,
    /// The bone to model space transform in the bind pose.
    pub base_pose: Matrix3x4,
    /// The inverse of [base_pose](#structfield.base_pose).
    pub base_pose_inv: Matrix3x4,
    #[br(assert(num_children >= 0, "negative child count {}", num_children))]
    pub num_children: i32,
    #[br(count = num_children as usize)]
    pub children: Vec<i32>,
}

impl GlaBone {
    /// Creates a bone without children and computes the inverse bind pose.
    pub fn new(name: &str, parent: Option<usize>, base_pose: Matrix3x4) -> Self {
        Self {
            name: GlaName::new(name),
            flags: BoneFlags::new(),
            parent: parent.map(|p| p as i32).unwrap_or(-1),
            base_pose,
            base_pose_inv: base_pose.inverse(),
            num_children: 0,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        self.name.to_string_lossy()
    }

    /// The parent index or `None` for negative parent values.
    pub fn parent_index(&self) -> Option<usize> {
        usize::try_from(self.parent).ok()
    }

    /// The size in bytes of the bone record including child indices.
    pub fn size_in_bytes(&self) -> usize {
        BONE_HEADER_SIZE + self.children.len() * std::mem::size_of::<i32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::{BinReaderExt, BinWriterExt};
    use std::io::Cursor;

    fn bone_bytes(parent: i32, num_children: i32, children: &[i32]) -> Vec<u8> {
        let mut bytes = GlaName::new("bone").0.to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&parent.to_le_bytes());
        for _ in 0..2 {
            for row in Matrix3x4::IDENTITY.rows {
                for value in row {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        bytes.extend_from_slice(&num_children.to_le_bytes());
        for child in children {
            bytes.extend_from_slice(&child.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn read_bone() {
        let bytes = bone_bytes(-1, 2, &[1, 2]);
        assert_eq!(BONE_HEADER_SIZE + 8, bytes.len());

        let bone: GlaBone = Cursor::new(bytes).read_le().unwrap();
        assert_eq!("bone", bone.name());
        assert!(bone.flags.always_transform());
        assert_eq!(None, bone.parent_index());
        assert_eq!(Matrix3x4::IDENTITY, bone.base_pose);
        assert_eq!(vec![1, 2], bone.children);
        assert_eq!(BONE_HEADER_SIZE + 8, bone.size_in_bytes());
    }

    #[test]
    fn read_bone_negative_child_count() {
        let bytes = bone_bytes(0, -1, &[]);
        let result = Cursor::new(bytes).read_le::<GlaBone>();
        assert!(matches!(result, Err(binrw::Error::AssertFail { .. })));
    }

    #[test]
    fn read_bone_truncated_children() {
        let bytes = bone_bytes(0, 3, &[1]);
        assert!(Cursor::new(bytes).read_le::<GlaBone>().is_err());
    }

    #[test]
    fn write_bone() {
        let bytes = bone_bytes(2, 1, &[3]);
        let bone: GlaBone = Cursor::new(bytes.clone()).read_le().unwrap();
        assert_eq!(Some(2), bone.parent_index());

        let mut writer = Cursor::new(Vec::new());
        writer.write_le(&bone).unwrap();
        assert_eq!(bytes, writer.into_inner());
    }
}
