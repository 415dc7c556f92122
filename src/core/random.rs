//! Pluggable random sources.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The randomness the engine consumes.
pub trait RandomSource {
    /// Uniform float in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in `[low, high]`. Bounds are swapped if reversed.
    fn range_inclusive(&mut self, low: i64, high: i64) -> i64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        // i128 holds the full span of i64::MIN..=i64::MAX
        let span = i128::from(high) - i128::from(low) + 1;
        let offset = (self.next_f64() * span as f64).floor() as i128;
        (i128::from(low) + offset.clamp(0, span - 1)) as i64
    }

    /// Uniform index into a collection of `len` items. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize {
        let i = (self.next_f64() * len as f64).floor() as usize;
        i.min(len.saturating_sub(1))
    }
}

/// A seedable source backed by `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn range_inclusive(&mut self, low: i64, high: i64) -> i64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed script of floats, repeating the last one once the script
/// runs out. An empty script behaves like a source fixed at zero.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    next: usize,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
                .collect(),
            next: 0,
        }
    }

    /// A source that always returns `value`.
    pub fn fixed(value: f64) -> Self {
        Self::new([value])
    }

    /// Number of values drawn so far.
    pub fn draws(&self) -> usize {
        self.next
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        let value = self
            .values
            .get(self.next)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0);
        self.next += 1;
        value
    }
}
