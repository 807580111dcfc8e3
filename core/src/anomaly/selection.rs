//! Which entities carry anomalies.
//!
//! Rounding policy: the flagged count is `r × N` rounded half-up, with a
//! minimum of one whenever both `r` and `N` are positive, and never more
//! than `N`.

use crate::{rng::StreamRng, types::EntityIndex};

pub fn flagged_count(rate: f64, population: usize) -> usize {
    if rate <= 0.0 || population == 0 {
        return 0;
    }
    // The epsilon keeps products such as 0.3 × 10 = 2.9999999999999996
    // on the intended side of the half-up boundary.
    let exact = rate * population as f64;
    let rounded = (exact + 0.5 + 1e-9).floor() as usize;
    rounded.clamp(1, population)
}

/// Pick `flagged_count(rate, population)` distinct indices, returned sorted.
pub fn select_entities(rate: f64, population: usize, rng: &mut StreamRng) -> Vec<EntityIndex> {
    let k = flagged_count(rate, population);
    let mut pool: Vec<EntityIndex> = (0..population as EntityIndex).collect();
    // Partial Fisher-Yates: the first k slots end up a uniform sample.
    for i in 0..k {
        let j = i + rng.next_u64_below((population - i) as u64) as usize;
        pool.swap(i, j);
    }
    let mut picked = pool[..k].to_vec();
    picked.sort_unstable();
    picked
}
