//! Seeded random sampling helpers
//!
//! Every Monte Carlo iteration owns its own `ChaCha8Rng` stream derived from
//! the run seed and the iteration index. Iterations can then run on any
//! thread in any order and still draw exactly the same numbers.

use crate::config::{NormalParam, Perturbation};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson, StandardNormal};

/// Derive an independent stream seed for `index` from the run seed.
///
/// Uses the `SplitMix64` finaliser so neighbouring indices produce unrelated
/// seeds.
#[must_use]
pub fn stream_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// RNG for stream `index` of a run seeded with `seed`
#[must_use]
pub fn stream_rng(seed: u64, index: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(stream_seed(seed, index))
}

/// Sample from a normal distribution; a zero standard deviation returns the mean
pub fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    let z: f64 = StandardNormal.sample(rng);
    mean + std_dev * z
}

/// Sample a [`NormalParam`]
pub fn sample_normal_param<R: Rng + ?Sized>(rng: &mut R, param: &NormalParam) -> f64 {
    sample_gaussian(rng, param.mean, param.std_dev)
}

/// Sample uniformly from `[low, high]`
pub fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high <= low {
        return low;
    }
    rng.random_range(low..=high)
}

/// Sample a configured perturbation law
pub fn sample_perturbation<R: Rng + ?Sized>(rng: &mut R, law: &Perturbation) -> f64 {
    match *law {
        Perturbation::Normal { mean, std_dev } => sample_gaussian(rng, mean, std_dev),
        Perturbation::Uniform { low, high } => sample_uniform(rng, low, high),
        Perturbation::Fixed { value } => value,
    }
}

/// Sample a Poisson count; non-positive means always give zero
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> usize {
    if lambda.is_nan() || lambda <= 0.0 {
        return 0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => {
            let k: f64 = dist.sample(rng);
            k as usize
        }
        Err(_) => 0,
    }
}

/// Bernoulli trial with probability `p` (clamped to [0, 1])
pub fn sample_bernoulli<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
    rng.random_bool(p)
}
