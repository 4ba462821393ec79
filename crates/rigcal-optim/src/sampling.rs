//! Run-scoped random sampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rigcal_core::Real;

pub const MIN_SAMPLE_FRACTION: Real = 0.1;

/// Random source shared by every random decision of one run.
///
/// Returns the generator and the seed it was built from. When no seed is
/// given one is drawn from the OS so the run can still be reproduced.
pub fn run_rng(seed: Option<u64>) -> (StdRng, u64) {
    let seed = seed.unwrap_or_else(|| rand::rng().random());
    log::info!("random seed: {seed}");
    (StdRng::seed_from_u64(seed), seed)
}

/// Number of items kept when sampling `fraction` of `population`.
pub fn sample_size(population: usize, fraction: Real) -> usize {
    let fraction = fraction.clamp(MIN_SAMPLE_FRACTION, 1.0);
    ((fraction * population as Real).round() as usize).min(population)
}

/// Sorted indices of a uniform subset without replacement.
pub fn sample_indices(rng: &mut StdRng, population: usize, fraction: Real) -> Vec<usize> {
    let amount = sample_size(population, fraction);
    if amount == 0 {
        return Vec::new();
    }
    let mut picked = rand::seq::index::sample(rng, population, amount).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(sample_size(100, 0.0), 10);
        assert_eq!(sample_size(100, 0.55), 55);
        assert_eq!(sample_size(100, 3.0), 100);
        assert_eq!(sample_size(4, 0.1), 0);
        assert_eq!(sample_size(0, 0.5), 0);
    }

    #[test]
    fn same_seed_same_samples() {
        let (mut a, _) = run_rng(Some(7));
        let (mut b, _) = run_rng(Some(7));
        let sa = sample_indices(&mut a, 200, 0.3);
        let sb = sample_indices(&mut b, 200, 0.3);
        assert_eq!(sa, sb);
        assert_eq!(sa.len(), 60);
        assert!(sa.windows(2).all(|w| w[0] < w[1]));
        assert!(sa.iter().all(|&i| i < 200));
    }

    #[test]
    fn full_fraction_keeps_everything() {
        let (mut rng, seed) = run_rng(Some(3));
        assert_eq!(seed, 3);
        assert_eq!(sample_indices(&mut rng, 12, 1.0), (0..12).collect::<Vec<_>>());
    }
}
