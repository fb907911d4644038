//! Deterministic noise fields feeding the height and moisture samplers.
//!
//! Everything here is a pure function of absolute world coordinates so
//! that two chunks sharing an edge agree on the height/moisture at that
//! edge regardless of which chunk is generated first (P2).

use crate::constants::MAP_SIZE;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use std::sync::OnceLock;

const BASE_SEED: u32 = 0x5EA_51DE;
const MOISTURE_SEED: u32 = BASE_SEED + 101;

fn base_noise() -> &'static Fbm<Perlin> {
    static NOISE: OnceLock<Fbm<Perlin>> = OnceLock::new();
    NOISE.get_or_init(|| {
        Fbm::<Perlin>::new(BASE_SEED)
            .set_octaves(4)
            .set_frequency(1.0 / 512.0)
            .set_persistence(0.5)
    })
}

fn moisture_noise() -> &'static Fbm<Perlin> {
    static NOISE: OnceLock<Fbm<Perlin>> = OnceLock::new();
    NOISE.get_or_init(|| {
        Fbm::<Perlin>::new(MOISTURE_SEED)
            .set_octaves(3)
            .set_frequency(1.0 / 300.0)
            .set_persistence(0.55)
    })
}

/// Classic GLSL-style 2D hash, used for small-scale biome variation.
/// `fract(sin(x*12.9898 + y*78.233) * 43758.5453)`
#[must_use]
pub fn hash2d(x: f64, y: f64) -> f64 {
    let v = (x * 12.9898 + y * 78.233).sin() * 43758.5453;
    v.fract().abs()
}

/// 4-octave sum of the base terrain noise in `[-1, 1]`-ish, evaluated at
/// absolute world coordinates.
#[must_use]
pub fn base_height_noise(wx: f64, wy: f64) -> f64 {
    base_noise().get([wx, wy])
}

/// Independent moisture field used for biome selection.
#[must_use]
pub fn moisture(wx: f64, wy: f64) -> f64 {
    // Remap from noise's [-1, 1] into [0, 1].
    (moisture_noise().get([wx, wy]) + 1.0) * 0.5
}

/// Ramps `0 -> 1` across the outer 25% of the map, producing ocean
/// borders regardless of the interior terrain.
#[must_use]
pub fn edge_fade(wx: f64, wy: f64) -> f64 {
    let margin = MAP_SIZE * 0.25;
    let dist_x = wx.min(MAP_SIZE - wx).max(0.0);
    let dist_y = wy.min(MAP_SIZE - wy).max(0.0);
    let dist = dist_x.min(dist_y);
    (dist / margin).clamp(0.0, 1.0)
}

/// Non-negative quadratic band centred at `(0.5*MAP_SIZE, 0.3*MAP_SIZE)`
/// that raises terrain toward a mountain range.
#[must_use]
pub fn mountain_boost(wx: f64, wy: f64) -> f64 {
    let cx = MAP_SIZE * 0.5;
    let cy = MAP_SIZE * 0.3;
    let radius = MAP_SIZE * 0.12;
    let dx = wx - cx;
    let dy = wy - cy;
    let dist2 = dx * dx + dy * dy;
    let r2 = radius * radius;
    (1.0 - dist2 / r2).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let a = base_height_noise(123.0, 456.0);
        let b = base_height_noise(123.0, 456.0);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn hash2d_is_deterministic_and_bounded() {
        for (x, y) in [(0.0, 0.0), (17.0, -4.0), (1000.0, 999.0)] {
            let v = hash2d(x, y);
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, hash2d(x, y));
        }
    }

    #[test]
    fn edge_fade_is_zero_at_corner_and_one_at_centre() {
        assert_eq!(edge_fade(0.0, 0.0), 0.0);
        assert_eq!(edge_fade(MAP_SIZE / 2.0, MAP_SIZE / 2.0), 1.0);
    }

    #[test]
    fn mountain_boost_peaks_at_centre_and_is_nonnegative() {
        let centre = mountain_boost(MAP_SIZE * 0.5, MAP_SIZE * 0.3);
        assert!(centre > 0.0);
        for wx in (0..(MAP_SIZE as i64)).step_by(257) {
            let wy = (wx as f64 * 0.37) % MAP_SIZE;
            assert!(mountain_boost(wx as f64, wy) >= 0.0);
        }
    }
}
