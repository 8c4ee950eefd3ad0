use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::prelude::*;

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
}

/// Random generator seeded with `seed`, or with a fresh random seed.
/// Returns the seed so a failing run can be reproduced.
pub fn seeded_rng(seed: Option<u64>) -> (StdRng, u64) {
    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    (StdRng::seed_from_u64(seed), seed)
}
