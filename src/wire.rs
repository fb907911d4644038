//! Serialised `ChunkData` wire format (spec.md §6.1), used for
//! persistence/interchange independent of the mesh cache.

use crate::constants::{MAX_HEIGHT, TILE_COUNT};
use crate::coord::ChunkCoord;
use crate::error::PipelineError;
use crate::generator::ChunkData;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read as _};

const MAGIC: u16 = 0x494D;
const VERSION: u8 = 1;
/// `2 (magic) + 1 (version) + 1 (reserved) + 2 (cx) + 2 (cy) + 4*1024`.
pub const ENCODED_LEN: usize = 8 + 4 * TILE_COUNT;

/// Encode `chunk` into the fixed [`ENCODED_LEN`]-byte wire format.
#[must_use]
pub fn encode_chunk_data(chunk: &ChunkData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENCODED_LEN);
    buf.write_u16::<LittleEndian>(MAGIC).unwrap();
    buf.write_u8(VERSION).unwrap();
    buf.write_u8(0).unwrap();
    buf.write_i16::<LittleEndian>(chunk.coord.cx as i16).unwrap();
    buf.write_i16::<LittleEndian>(chunk.coord.cy as i16).unwrap();
    buf.extend_from_slice(chunk.heights.as_slice());
    buf.extend_from_slice(chunk.biomes.as_slice());
    buf.extend_from_slice(chunk.flags.as_slice());
    buf.extend_from_slice(chunk.provinces.as_slice());
    debug_assert_eq!(buf.len(), ENCODED_LEN);
    buf
}

/// Decode a [`ENCODED_LEN`]-byte blob back into a `ChunkData`. Rejects a
/// wrong total size, a wrong magic/version, or any height exceeding
/// [`MAX_HEIGHT`].
pub fn decode_chunk_data(bytes: &[u8]) -> Result<ChunkData, PipelineError> {
    if bytes.len() != ENCODED_LEN {
        return Err(PipelineError::DecodeError(format!(
            "expected {ENCODED_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_u16::<LittleEndian>().unwrap();
    if magic != MAGIC {
        return Err(PipelineError::DecodeError(format!("bad magic 0x{magic:04x}")));
    }
    let version = cursor.read_u8().unwrap();
    if version != VERSION {
        return Err(PipelineError::DecodeError(format!("unsupported version {version}")));
    }
    let _reserved = cursor.read_u8().unwrap();
    let cx = cursor.read_i16::<LittleEndian>().unwrap();
    let cy = cursor.read_i16::<LittleEndian>().unwrap();

    let mut heights = Box::new([0u8; TILE_COUNT]);
    let mut biomes = Box::new([0u8; TILE_COUNT]);
    let mut flags = Box::new([0u8; TILE_COUNT]);
    let mut provinces = Box::new([0u8; TILE_COUNT]);
    cursor.read_exact(heights.as_mut_slice()).unwrap();
    cursor.read_exact(biomes.as_mut_slice()).unwrap();
    cursor.read_exact(flags.as_mut_slice()).unwrap();
    cursor.read_exact(provinces.as_mut_slice()).unwrap();

    if let Some(&bad) = heights.iter().find(|&&h| h > MAX_HEIGHT) {
        return Err(PipelineError::DecodeError(format!("height {bad} exceeds max {MAX_HEIGHT}")));
    }

    Ok(ChunkData {
        coord: ChunkCoord::new(i32::from(cx), i32::from(cy)),
        heights,
        biomes,
        flags,
        provinces,
    })
}
