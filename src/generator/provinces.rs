//! Deterministic Voronoi province seeds.
//!
//! The 42 seeds (four of them corner "barbarian" seeds sharing id 0) are
//! computed once from a fixed hash of grid indices and memoized for the
//! process lifetime, per spec.md §4.1.

use super::noise::hash2d;
use crate::constants::{MAP_SIZE, PROVINCE_SEED_COUNT};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
pub struct ProvinceSeed {
    pub x: f64,
    pub y: f64,
    pub id: u8,
}

const CORNER_SEED_COUNT: usize = 4;

fn seeds() -> &'static [ProvinceSeed; PROVINCE_SEED_COUNT] {
    static SEEDS: OnceLock<[ProvinceSeed; PROVINCE_SEED_COUNT]> = OnceLock::new();
    SEEDS.get_or_init(build_seeds)
}

fn build_seeds() -> [ProvinceSeed; PROVINCE_SEED_COUNT] {
    let corners = [
        (0.05, 0.05),
        (0.95, 0.05),
        (0.05, 0.95),
        (0.95, 0.95),
    ];

    let mut out = [ProvinceSeed { x: 0.0, y: 0.0, id: 0 }; PROVINCE_SEED_COUNT];
    for (i, (fx, fy)) in corners.iter().enumerate() {
        out[i] = ProvinceSeed {
            x: fx * MAP_SIZE,
            y: fy * MAP_SIZE,
            id: 0,
        };
    }

    for i in CORNER_SEED_COUNT..PROVINCE_SEED_COUNT {
        let gi = i as f64;
        let hx = hash2d(gi, gi * 7.0 + 1.0);
        let hy = hash2d(gi * 3.0 + 2.0, gi);
        out[i] = ProvinceSeed {
            x: hx * MAP_SIZE,
            y: hy * MAP_SIZE,
            id: (i - CORNER_SEED_COUNT + 1) as u8,
        };
    }
    out
}

/// Id of the seed nearest to `(wx, wy)`.
#[must_use]
pub fn nearest_seed_id(wx: f64, wy: f64) -> u8 {
    seeds()
        .iter()
        .min_by(|a, b| {
            let da = (a.x - wx).powi(2) + (a.y - wy).powi(2);
            let db = (b.x - wx).powi(2) + (b.y - wy).powi(2);
            da.partial_cmp(&db).unwrap()
        })
        .map_or(0, |s| s.id)
}

/// All seeds, exposed for the road generator which connects nearby
/// province centroids.
#[must_use]
pub fn all_seeds() -> &'static [ProvinceSeed; PROVINCE_SEED_COUNT] {
    seeds()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_memoized_and_deterministic() {
        let a = all_seeds();
        let b = all_seeds();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.x.to_bits(), sb.x.to_bits());
            assert_eq!(sa.id, sb.id);
        }
    }

    #[test]
    fn four_corner_seeds_share_id_zero() {
        let zero_count = all_seeds().iter().filter(|s| s.id == 0).count();
        assert_eq!(zero_count, CORNER_SEED_COUNT);
    }

    #[test]
    fn nearest_seed_is_stable_per_point() {
        let id1 = nearest_seed_id(100.0, 100.0);
        let id2 = nearest_seed_id(100.0, 100.0);
        assert_eq!(id1, id2);
    }
}
