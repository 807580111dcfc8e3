//! Deterministic random number generation.
//!
//! RULE: Nothing in the generator may call any platform RNG or clock.
//! All randomness flows through StreamRng instances derived from the
//! single global seed in the configuration.
//!
//! Every (entity, stream) pair gets its own RNG, seeded from
//! (global_seed, entity_index, stream_slot). This means:
//!   - Worker scheduling order never changes any entity's output.
//!   - Adding a new stream never changes existing streams.
//!   - Each entity's stream is fully reproducible in isolation.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::types::EntityIndex;

/// A named, deterministic RNG for one entity and one concern.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from the global seed, an entity index and a stable
    /// stream slot. Neither the index nor the slot may change once assigned.
    pub fn new(global_seed: u64, entity_index: u64, slot: u64) -> Self {
        let mixed = splitmix64(
            global_seed
                ^ entity_index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
                ^ slot.wrapping_mul(0xc2b2_ae3d_27d4_eb4f),
        );
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(mixed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll an integer in [lo, hi] inclusive.
    pub fn range_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        assert!(lo <= hi, "empty range {lo}..={hi}");
        let span = (hi - lo) as u64 + 1;
        lo + self.next_u64_below(span) as i64
    }

    /// Roll a float in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Standard normal via Box-Muller.
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Log-normal draw parameterised by the underlying normal.
    pub fn log_normal(&mut self, mu: f64, sigma: f64) -> f64 {
        (mu + sigma * self.standard_normal()).exp()
    }

    /// Poisson draw (Knuth). Only used with small rates.
    pub fn poisson(&mut self, lambda: f64) -> u32 {
        if lambda <= 0.0 {
            return 0;
        }
        let limit = (-lambda).exp();
        let mut k = 0u32;
        let mut p = 1.0;
        loop {
            p *= self.next_f64();
            if p <= limit {
                return k;
            }
            k += 1;
        }
    }

    /// Pick an index with probability proportional to its weight.
    /// Returns None when all weights are zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            cumulative += w;
            last_positive = Some(i);
            if roll < cumulative {
                return Some(i);
            }
        }
        last_positive
    }

    /// Pick one element uniformly.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.next_u64_below(items.len() as u64) as usize]
    }

    /// Fill a 16-byte buffer, used to build reproducible UUIDs.
    pub fn next_bytes16(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        self.inner.fill_bytes(&mut out);
        out
    }
}

/// Factory for every stream in a run.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    global_seed: u64,
}

impl RngBank {
    pub fn new(global_seed: u64) -> Self {
        Self { global_seed }
    }

    pub fn seed(&self) -> u64 {
        self.global_seed
    }

    /// Stream for one entity and one concern.
    pub fn for_entity(&self, index: EntityIndex, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.global_seed, u64::from(index) + 1, slot as u64).with_name(slot.name())
    }

    /// Stream for run-wide decisions (entity index 0 is reserved for these).
    pub fn for_run(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.global_seed, 0, slot as u64).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Registry = 0,
    Address = 1,
    Transaction = 2,
    Timeline = 3,
    Selection = 4,
    Anomaly = 5,
    RunIdentity = 6,
    Update = 7,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Address => "address",
            Self::Transaction => "transaction",
            Self::Timeline => "timeline",
            Self::Selection => "selection",
            Self::Anomaly => "anomaly",
            Self::RunIdentity => "run_identity",
            Self::Update => "update",
        }
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
