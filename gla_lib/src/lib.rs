//! # gla_lib
//!
//! gla_lib is a library for safe reading and writing of the GLA skeletal animation format.
//! A GLA file stores a bone hierarchy with bind pose matrices and a shared pool of compressed
//! per frame bone samples.
//!
//! The file is read into memory once and every offset is checked against the file size
//! before it is used. Malformed files produce a [GlaError] instead of a panic.
//!
//! ## Layout
//! - [GlaHeader] with the file identifier, version, counts and section offsets
//! - a table of [i32] bone offsets relative to the end of the header
//! - [GlaBone] records with parent indices and bind pose matrices
//! - a frame index table of 3 byte pool indices for each frame and bone
//! - a pool of 14 byte [CompressedBone](compressed::CompressedBone) samples
//!
//! ## Example
/*!
```no_run
# fn main() -> Result<(), Box<dyn std::error::Error>> {
let gla = gla_lib::Gla::from_file("humanoid.gla")?;
for bone in 0..gla.bone_count() {
    let (translation, rotation) = gla.bone_transform(0, bone)?;
    println!("{}: {translation} {rotation}", gla.bones[bone].name());
}
# Ok(())
# }
```
 */
pub mod bone;
pub mod compressed;
pub mod header;
pub mod hierarchy;
pub mod math;
pub mod matrix;

mod export;

pub use bone::{BoneFlags, GlaBone};
pub use header::{GlaHeader, GlaName, GLA_IDENT, GLA_VERSION, HEADER_SIZE};
pub use math::Transform;
pub use matrix::Matrix3x4;

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use binrw::BinReaderExt;
use glam::{Quat, Vec3};
use thiserror::Error;

use bone::BONE_HEADER_SIZE;
use compressed::{
    read_pool_index, write_pool_index, CompressedBone, COMPRESSED_BONE_SIZE, MAX_POOL_INDEX,
    POOL_INDEX_SIZE,
};
use hierarchy::{evaluation_order, HierarchyError};
use math::world_to_local;

/// Errors while reading, validating, or accessing GLA data.
#[derive(Debug, Error)]
pub enum GlaError {
    #[error("invalid file identifier 0x{found:08X}, expected 0x{:08X}", GLA_IDENT)]
    InvalidMagic { found: u32 },

    #[error("unsupported version {found}, expected {}", GLA_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("{field} must not be negative but was {value}")]
    NegativeCount { field: &'static str, value: i32 },

    #[error(
        "{section} at offset {offset} with size {size} does not fit in a file of {file_size} bytes"
    )]
    OutOfBounds {
        section: &'static str,
        offset: i64,
        size: u64,
        file_size: usize,
    },

    #[error("failed to read bone {bone}")]
    InvalidBone {
        bone: usize,
        #[source]
        source: binrw::Error,
    },

    #[error("bone {bone} has invalid parent index {parent}")]
    InvalidParent { bone: usize, parent: i32 },

    #[error("bone {bone} is its own ancestor")]
    CyclicHierarchy { bone: usize },

    #[error("frame {frame} is out of range for {frame_count} frames")]
    FrameOutOfRange { frame: usize, frame_count: usize },

    #[error("bone {bone} is out of range for {bone_count} bones")]
    BoneOutOfRange { bone: usize, bone_count: usize },

    #[error(
        "pool index {index} for frame {frame} bone {bone} is out of range for {pool_size} samples"
    )]
    PoolIndexOutOfRange {
        frame: usize,
        bone: usize,
        index: usize,
        pool_size: usize,
    },

    #[error("expected {expected} frame index entries but found {actual}")]
    FrameIndexCount { expected: usize, actual: usize },

    #[error(transparent)]
    BinRead(#[from] binrw::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A fully loaded and validated GLA file.
///
/// Bones and sample data are immutable after loading.
/// Bone indices may reference parents stored after the bone itself,
/// so use [Gla::evaluation_order] when processing parents before children.
#[derive(Debug, Clone, PartialEq)]
pub struct Gla {
    pub header: GlaHeader,
    pub bones: Vec<GlaBone>,
    frame_indices: Vec<u8>,
    bone_pool: Vec<CompressedBone>,
    evaluation_order: Vec<usize>,
}

impl Gla {
    /// Tries to read and validate a GLA file from `path`.
    /// The entire file is buffered for performance.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GlaError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Tries to read and validate a GLA file from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, GlaError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Tries to read and validate a GLA file from its bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GlaError> {
        let file_size = bytes.len();
        check_range("header", 0, HEADER_SIZE as u64, file_size)?;

        let mut reader = Cursor::new(bytes);
        let header: GlaHeader = reader.read_le()?;
        if header.ident != GLA_IDENT {
            return Err(GlaError::InvalidMagic {
                found: header.ident,
            });
        }
        if header.version != GLA_VERSION {
            return Err(GlaError::UnsupportedVersion {
                found: header.version,
            });
        }

        let frame_count = non_negative("frame_count", header.frame_count)?;
        let bone_count = non_negative("bone_count", header.bone_count)?;

        for (section, offset) in [
            ("frames_offset", header.frames_offset),
            ("bone_pool_offset", header.bone_pool_offset),
            ("skeleton_offset", header.skeleton_offset),
            ("end_offset", header.end_offset),
        ] {
            check_range(section, offset as i64, 0, file_size)?;
        }

        let bones = read_bones(&mut reader, bone_count, file_size)?;
        let evaluation_order = bone_evaluation_order(&bones)?;

        let frame_table_size = (frame_count as u64) * (bone_count as u64) * POOL_INDEX_SIZE as u64;
        let frames_start = check_range(
            "frame index table",
            header.frames_offset as i64,
            frame_table_size,
            file_size,
        )?;
        let frame_indices = bytes[frames_start..frames_start + frame_table_size as usize].to_vec();

        let bone_pool = read_bone_pool(&mut reader, &header, file_size)?;

        tracing::debug!(
            name = %header.name.to_string_lossy(),
            frame_count,
            bone_count,
            pool_size = bone_pool.len(),
            "loaded GLA"
        );

        Ok(Self {
            header,
            bones,
            frame_indices,
            bone_pool,
            evaluation_order,
        })
    }

    /// Creates a GLA from bones and per frame sample indices.
    ///
    /// `pool_indices` stores one index into `bone_pool` for each bone of each frame in frame major order.
    /// The child lists of `bones` are recalculated from the parent indices.
    /// The header offsets are calculated when writing.
    pub fn new(
        name: &str,
        mut bones: Vec<GlaBone>,
        frame_count: usize,
        pool_indices: &[u32],
        bone_pool: Vec<CompressedBone>,
    ) -> Result<Self, GlaError> {
        let bone_count = bones.len();
        let expected = frame_count * bone_count;
        if pool_indices.len() != expected {
            return Err(GlaError::FrameIndexCount {
                expected,
                actual: pool_indices.len(),
            });
        }

        for (i, index) in pool_indices.iter().enumerate() {
            if *index as usize >= bone_pool.len() || *index > MAX_POOL_INDEX {
                return Err(GlaError::PoolIndexOutOfRange {
                    frame: i / bone_count.max(1),
                    bone: i % bone_count.max(1),
                    index: *index as usize,
                    pool_size: bone_pool.len(),
                });
            }
        }

        let evaluation_order = bone_evaluation_order(&bones)?;

        let parents: Vec<_> = bones.iter().map(|b| b.parent).collect();
        for (i, bone) in bones.iter_mut().enumerate() {
            bone.children = (0..bone_count as i32)
                .filter(|c| parents[*c as usize] == i as i32)
                .collect();
            bone.num_children = bone.children.len() as i32;
        }

        let frame_indices = pool_indices
            .iter()
            .flat_map(|i| write_pool_index(*i))
            .collect();

        let mut gla = Self {
            header: GlaHeader {
                ident: GLA_IDENT,
                version: GLA_VERSION,
                name: GlaName::new(name),
                scale: 1.0,
                frame_count: frame_count as i32,
                frames_offset: 0,
                bone_count: bone_count as i32,
                bone_pool_offset: 0,
                skeleton_offset: 0,
                end_offset: 0,
            },
            bones,
            frame_indices,
            bone_pool,
            evaluation_order,
        };
        gla.header = export::layout_header(&gla);
        Ok(gla)
    }

    /// Writes the file to `writer` with offsets recalculated from the current data.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), GlaError> {
        export::write_buffered(writer, |c| export::write_gla(c, self))
    }

    /// Writes the file to `path`.
    /// The entire file is buffered for performance.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GlaError> {
        let mut file = std::fs::File::create(path)?;
        self.write(&mut file)
    }

    /// The name stored in the header.
    pub fn name(&self) -> String {
        self.header.name.to_string_lossy()
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// The number of samples in the compressed bone pool.
    pub fn pool_size(&self) -> usize {
        self.bone_pool.len()
    }

    /// Bone indices ordered so that every parent precedes its children.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.evaluation_order
    }

    pub fn bone(&self, bone: usize) -> Result<&GlaBone, GlaError> {
        self.bones.get(bone).ok_or(GlaError::BoneOutOfRange {
            bone,
            bone_count: self.bones.len(),
        })
    }

    /// The parent of `bone` or `None` for root bones and out of range indices.
    pub fn parent_index(&self, bone: usize) -> Option<usize> {
        self.bones.get(bone).and_then(GlaBone::parent_index)
    }

    /// The index of the first bone named `name`.
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name() == name)
    }

    pub fn bone_names(&self) -> Vec<String> {
        self.bones.iter().map(GlaBone::name).collect()
    }

    /// The pool index for `bone` at `frame` from the frame index table.
    pub fn bone_pool_index(&self, frame: usize, bone: usize) -> Result<usize, GlaError> {
        let frame_count = self.frame_count();
        if frame >= frame_count {
            return Err(GlaError::FrameOutOfRange { frame, frame_count });
        }
        let bone_count = self.bone_count();
        if bone >= bone_count {
            return Err(GlaError::BoneOutOfRange { bone, bone_count });
        }

        let offset = (frame * bone_count + bone) * POOL_INDEX_SIZE;
        let bytes = self
            .frame_indices
            .get(offset..offset + POOL_INDEX_SIZE)
            .ok_or(GlaError::OutOfBounds {
                section: "frame index",
                offset: offset as i64,
                size: POOL_INDEX_SIZE as u64,
                file_size: self.frame_indices.len(),
            })?;
        Ok(read_pool_index([bytes[0], bytes[1], bytes[2]]) as usize)
    }

    /// The decompressed translation and rotation of `bone` at `frame` relative to its bind pose.
    pub fn bone_transform(&self, frame: usize, bone: usize) -> Result<(Vec3, Quat), GlaError> {
        let index = self.bone_pool_index(frame, bone)?;
        let sample = self
            .bone_pool
            .get(index)
            .ok_or(GlaError::PoolIndexOutOfRange {
                frame,
                bone,
                index,
                pool_size: self.bone_pool.len(),
            })?;
        Ok(sample.decompress())
    }

    /// The model space bind pose of `bone` decomposed into translation, rotation, and scale.
    pub fn bind_pose_transform(&self, bone: usize) -> Result<Transform, GlaError> {
        Ok(self.bone(bone)?.base_pose.decompose())
    }

    /// The model space bind pose position of `bone`.
    pub fn bind_pose_position(&self, bone: usize) -> Result<Vec3, GlaError> {
        Ok(self.bone(bone)?.base_pose.translation())
    }

    /// The bind pose of `bone` relative to its parent's bind pose.
    ///
    /// Root bones use the decomposed bind pose directly.
    /// Other bones use the rotation and offset from the parent in the parent's rotated frame with unit scale.
    pub fn local_bind_pose_transform(&self, bone: usize) -> Result<Transform, GlaError> {
        let world = self.bind_pose_transform(bone)?;
        match self.parent_index(bone) {
            Some(parent) => {
                let parent = self.bind_pose_transform(parent)?;
                let (translation, rotation) = world_to_local(
                    parent.translation,
                    parent.rotation,
                    world.translation,
                    world.rotation,
                );
                Ok(Transform::new(translation, rotation))
            }
            None => Ok(world),
        }
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<usize, GlaError> {
    usize::try_from(value).map_err(|_| GlaError::NegativeCount { field, value })
}

/// Checks that `size` bytes at `offset` fit in the file and returns the start.
fn check_range(
    section: &'static str,
    offset: i64,
    size: u64,
    file_size: usize,
) -> Result<usize, GlaError> {
    let out_of_bounds = || GlaError::OutOfBounds {
        section,
        offset,
        size,
        file_size,
    };
    let start = u64::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(size).ok_or_else(out_of_bounds)?;
    if end > file_size as u64 {
        return Err(out_of_bounds());
    }
    Ok(start as usize)
}

fn read_bones(
    reader: &mut Cursor<&[u8]>,
    bone_count: usize,
    file_size: usize,
) -> Result<Vec<GlaBone>, GlaError> {
    let table_size = bone_count as u64 * std::mem::size_of::<i32>() as u64;
    check_range("bone offset table", HEADER_SIZE as i64, table_size, file_size)?;

    reader.set_position(HEADER_SIZE as u64);
    let offsets = (0..bone_count)
        .map(|_| reader.read_le::<i32>())
        .collect::<Result<Vec<_>, _>>()?;

    offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            // Bone offsets are relative to the end of the header.
            let start = check_range(
                "bone",
                HEADER_SIZE as i64 + *offset as i64,
                BONE_HEADER_SIZE as u64,
                file_size,
            )?;
            reader.set_position(start as u64);
            reader
                .read_le::<GlaBone>()
                .map_err(|source| GlaError::InvalidBone { bone: i, source })
        })
        .collect()
}

fn bone_evaluation_order(bones: &[GlaBone]) -> Result<Vec<usize>, GlaError> {
    let parents = bones
        .iter()
        .enumerate()
        .map(|(i, b)| match b.parent {
            -1 => Ok(None),
            p if p >= 0 => Ok(Some(p as usize)),
            p => Err(GlaError::InvalidParent { bone: i, parent: p }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    evaluation_order(&parents).map_err(|e| match e {
        HierarchyError::InvalidParent { index, parent, .. } => GlaError::InvalidParent {
            bone: index,
            parent: parent as i32,
        },
        HierarchyError::Cycle { index } => GlaError::CyclicHierarchy { bone: index },
    })
}

fn read_bone_pool(
    reader: &mut Cursor<&[u8]>,
    header: &GlaHeader,
    file_size: usize,
) -> Result<Vec<CompressedBone>, GlaError> {
    let start = check_range(
        "bone pool",
        header.bone_pool_offset as i64,
        0,
        file_size,
    )?;

    // The pool extends to the next section or the end of the file.
    let end = [
        header.skeleton_offset,
        header.frames_offset,
        header.end_offset,
    ]
    .iter()
    .filter_map(|o| usize::try_from(*o).ok())
    .filter(|o| *o > start)
    .chain(std::iter::once(file_size))
    .min()
    .unwrap_or(file_size);

    let count = (end - start) / COMPRESSED_BONE_SIZE;
    reader.set_position(start as u64);
    let pool = (0..count)
        .map(|_| reader.read_le::<CompressedBone>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pool)
}
