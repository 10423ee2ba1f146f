//! Cross-structure tests: the indexes must agree with each other and with a
//! brute-force scan on the same dataset.


use rand::prelude::*;

pub(crate) fn random_points_2d(n: usize, extent: f64, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (rng.gen_range(0.0..extent), rng.gen_range(0.0..extent)))
        .collect()
}
