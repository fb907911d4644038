//! Mesh-cache value codec (spec.md §6.2): four length-prefixed
//! little-endian arrays packed into one self-describing blob.

use crate::mesh::MeshBuffers;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Pack `buffers` into the cache value format.
#[must_use]
pub fn encode_mesh_buffers(buffers: &MeshBuffers) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        16 + buffers.positions.len() * 4
            + buffers.normals.len() * 4
            + buffers.colors.len() * 4
            + buffers.indices.len() * 4,
    );
    write_f32_array(&mut out, &buffers.positions);
    write_f32_array(&mut out, &buffers.normals);
    write_f32_array(&mut out, &buffers.colors);
    write_u32_array(&mut out, &buffers.indices);
    out
}

/// Unpack a blob produced by [`encode_mesh_buffers`]. Returns `None` on
/// any malformed/truncated input; the cache treats that the same as a
/// miss.
#[must_use]
pub fn decode_mesh_buffers(bytes: &[u8]) -> Option<MeshBuffers> {
    let mut cursor = Cursor::new(bytes);
    let positions = read_f32_array(&mut cursor)?;
    let normals = read_f32_array(&mut cursor)?;
    let colors = read_f32_array(&mut cursor)?;
    let indices = read_u32_array(&mut cursor)?;
    Some(MeshBuffers { positions, normals, colors, indices })
}

fn write_f32_array(out: &mut Vec<u8>, values: &[f32]) {
    out.write_u32::<LittleEndian>(values.len() as u32).unwrap();
    for &v in values {
        out.write_f32::<LittleEndian>(v).unwrap();
    }
}

fn write_u32_array(out: &mut Vec<u8>, values: &[u32]) {
    out.write_u32::<LittleEndian>(values.len() as u32).unwrap();
    for &v in values {
        out.write_u32::<LittleEndian>(v).unwrap();
    }
}

fn read_f32_array(cursor: &mut Cursor<&[u8]>) -> Option<Vec<f32>> {
    let len = cursor.read_u32::<LittleEndian>().ok()? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(cursor.read_f32::<LittleEndian>().ok()?);
    }
    Some(out)
}

fn read_u32_array(cursor: &mut Cursor<&[u8]>) -> Option<Vec<u32>> {
    let len = cursor.read_u32::<LittleEndian>().ok()? as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(cursor.read_u32::<LittleEndian>().ok()?);
    }
    Some(out)
}
