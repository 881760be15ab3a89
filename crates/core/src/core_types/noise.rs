//! Deterministic value noise for synthetic landscapes
//!
//! Used to generate reproducible raster fields (vegetation, terrain, soil)
//! when no real data provider is available. The same coordinates and seed
//! always produce the same value, on every platform.

/// Lattice hashing primes
const PRIME_X: i64 = 1619;
const PRIME_Y: i64 = 31337;

/// Largest positive 31-bit value as f64
const MAX_HASH: f64 = 0x7fff_ffff as f64;

/// Hash a lattice corner to [0, 1]
#[inline]
fn hash_2d(x: i64, y: i64, seed: u32) -> f64 {
    let mut n = x
        .wrapping_mul(PRIME_X)
        .wrapping_add(y.wrapping_mul(PRIME_Y))
        .wrapping_add(i64::from(seed)) as i32;
    n = (n << 13) ^ n;
    n = n
        .wrapping_mul(n.wrapping_mul(n).wrapping_mul(15731).wrapping_add(789_221))
        .wrapping_add(1_376_312_589);
    f64::from(n & 0x7fff_ffff) / MAX_HASH
}

/// Hermite fade
#[inline]
fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Smooth 2D value noise in [-1, 1].
///
/// `x` and `y` are in the same unit as `scale` (km for the synthetic rasters);
/// features are roughly `scale` wide.
#[must_use]
pub fn value_noise_2d(x: f64, y: f64, scale: f64, seed: u32) -> f64 {
    let sx = x / scale;
    let sy = y / scale;
    let (fx0, fy0) = (sx.floor(), sy.floor());
    let (x0, y0) = (fx0 as i64, fy0 as i64);

    let fx = smoothstep(sx - fx0);
    let fy = smoothstep(sy - fy0);

    let v00 = hash_2d(x0, y0, seed);
    let v10 = hash_2d(x0 + 1, y0, seed);
    let v01 = hash_2d(x0, y0 + 1, seed);
    let v11 = hash_2d(x0 + 1, y0 + 1, seed);

    let v0 = v00 + fx * (v10 - v00);
    let v1 = v01 + fx * (v11 - v01);
    (v0 + fy * (v1 - v0)) * 2.0 - 1.0
}

/// Fractal sum of `octaves` noise layers, normalised back to [-1, 1]
#[must_use]
pub fn fbm_2d(x: f64, y: f64, scale: f64, octaves: u32, persistence: f64, seed: u32) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for i in 0..octaves {
        let octave_seed = seed.wrapping_add(i);
        total += value_noise_2d(x * frequency, y * frequency, scale, octave_seed) * amplitude;
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= 2.0;
    }

    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_range() {
        for i in 0..500 {
            let x = f64::from(i) * 0.37 - 90.0;
            let y = f64::from(i) * 1.13 + 12.0;
            let v = value_noise_2d(x, y, 5.0, 7);
            assert!((-1.0..=1.0).contains(&v), "noise {v} at ({x}, {y})");
            let f = fbm_2d(x, y, 5.0, 4, 0.5, 7);
            assert!((-1.0..=1.0).contains(&f));
        }
    }

    #[test]
    fn test_noise_deterministic_and_seeded() {
        let a = value_noise_2d(12.5, -3.25, 10.0, 1);
        assert_eq!(a, value_noise_2d(12.5, -3.25, 10.0, 1));
        assert_ne!(a, value_noise_2d(12.5, -3.25, 10.0, 2));
    }

    #[test]
    fn test_noise_is_continuous() {
        let a = value_noise_2d(4.0, 4.0, 10.0, 3);
        let b = value_noise_2d(4.001, 4.0, 10.0, 3);
        assert!((a - b).abs() < 1e-3);
    }
}
