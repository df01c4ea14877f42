use binrw::BinWriterExt;
use std::io::{Cursor, Seek, Write};

use crate::compressed::{COMPRESSED_BONE_SIZE, POOL_INDEX_SIZE};
use crate::{Gla, GlaError, GlaHeader, HEADER_SIZE};

fn round_up(value: usize, n: usize) -> usize {
    // Find the next largest multiple of n.
    value.div_ceil(n) * n
}

/// Section offsets for writing `gla` with the bone offset table directly after the header.
struct Layout {
    bone_offsets: Vec<i32>,
    frames_offset: usize,
    bone_pool_offset: usize,
    end_offset: usize,
}

fn layout(gla: &Gla) -> Layout {
    let table_size = gla.bones.len() * std::mem::size_of::<i32>();

    // Bone offsets are relative to the end of the header.
    let mut bone_offsets = Vec::with_capacity(gla.bones.len());
    let mut offset = table_size;
    for bone in &gla.bones {
        bone_offsets.push(offset as i32);
        offset += bone.size_in_bytes();
    }

    let frames_offset = HEADER_SIZE + offset;
    let frame_table_size = gla.frame_count() * gla.bone_count() * POOL_INDEX_SIZE;
    let bone_pool_offset = round_up(frames_offset + frame_table_size, 4);
    let end_offset = bone_pool_offset + gla.pool_size() * COMPRESSED_BONE_SIZE;

    Layout {
        bone_offsets,
        frames_offset,
        bone_pool_offset,
        end_offset,
    }
}

pub(crate) fn layout_header(gla: &Gla) -> GlaHeader {
    let layout = layout(gla);
    GlaHeader {
        frames_offset: layout.frames_offset as i32,
        bone_pool_offset: layout.bone_pool_offset as i32,
        skeleton_offset: HEADER_SIZE as i32,
        end_offset: layout.end_offset as i32,
        bone_count: gla.bones.len() as i32,
        ..gla.header.clone()
    }
}

pub(crate) fn write_gla<W: Write + Seek>(writer: &mut W, gla: &Gla) -> Result<(), GlaError> {
    let layout = layout(gla);
    writer.write_le(&layout_header(gla))?;
    writer.write_le(&layout.bone_offsets)?;
    for bone in &gla.bones {
        writer.write_le(bone)?;
    }

    writer.write_all(&gla.frame_indices)?;
    let padding = layout.bone_pool_offset - layout.frames_offset - gla.frame_indices.len();
    writer.write_all(&vec![0u8; padding])?;

    writer.write_le(&gla.bone_pool)?;
    Ok(())
}

pub(crate) fn write_buffered<W: Write + Seek, F: Fn(&mut Cursor<Vec<u8>>) -> Result<(), GlaError>>(
    writer: &mut W,
    write_data: F,
) -> Result<(), GlaError> {
    // Buffer the entire write operation into memory to improve performance.
    let mut cursor = Cursor::new(Vec::new());
    write_data(&mut cursor)?;

    writer.write_all(cursor.get_mut())?;
    Ok(())
}
