//! Content hashing (component C3): a fast, non-cryptographic fingerprint
//! of a chunk's four tile arrays, used as the cache key's last segment.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over a byte slice.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Fingerprint of a chunk's tile arrays: `"<h>-<b>-<f>-<p>"`, each field
/// a lowercase hex FNV-1a of the matching array.
#[must_use]
pub fn fingerprint(chunk: &crate::generator::ChunkData) -> String {
    format!(
        "{:08x}-{:08x}-{:08x}-{:08x}",
        fnv1a(chunk.heights.as_slice()),
        fnv1a(chunk.biomes.as_slice()),
        fnv1a(chunk.flags.as_slice()),
        fnv1a(chunk.provinces.as_slice()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::ChunkCoord;
    use crate::generator::generate;

    #[test]
    fn fnv1a_is_deterministic() {
        let data = b"hello world";
        assert_eq!(fnv1a(data), fnv1a(data));
    }

    #[test]
    fn fnv1a_matches_known_vector() {
        // Canonical FNV-1a 32-bit test vector for the empty string.
        assert_eq!(fnv1a(b""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn fingerprint_is_stable_across_runs() {
        let chunk = generate(ChunkCoord::new(7, 7), None, None);
        assert_eq!(fingerprint(&chunk), fingerprint(&chunk));
    }

    #[test]
    fn fingerprint_changes_when_any_array_byte_changes() {
        let mut chunk = generate(ChunkCoord::new(7, 7), None, None);
        let before = fingerprint(&chunk);
        chunk.heights[0] = chunk.heights[0].wrapping_add(1);
        let after = fingerprint(&chunk);
        assert_ne!(before, after);
    }

    #[test]
    fn fingerprint_has_four_hyphen_separated_hex_fields() {
        let chunk = generate(ChunkCoord::new(1, 1), None, None);
        let fp = fingerprint(&chunk);
        let parts: Vec<&str> = fp.split('-').collect();
        assert_eq!(parts.len(), 4);
        for p in parts {
            assert_eq!(p.len(), 8);
            assert!(p.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
