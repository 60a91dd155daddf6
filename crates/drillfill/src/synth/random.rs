//! Seedable random source used by the record synthesizer

use rand::distributions::uniform::SampleUniform;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, RngCore, SeedableRng};

/// Explicit random source.
///
/// Every draw the synthesizer makes goes through one of these, so a run is
/// fully determined by its seed.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    /// Create a source from a 64-bit seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw a fresh seed from OS entropy
    pub fn entropy_seed() -> u64 {
        rand::thread_rng().gen()
    }

    /// Uniformly pick one element.
    ///
    /// # Panics
    ///
    /// Panics if `items` is empty. All pools are non-empty constants.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }

    /// Uniform integer in `[min, max]`
    pub fn int<T>(&mut self, min: T, max: T) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.rng.gen_range(min..=max)
    }

    /// Uniform float in `[min, max]`, rounded to `decimals` places
    pub fn float(&mut self, min: f64, max: f64, decimals: u32) -> f64 {
        let value = self.rng.gen_range(min..=max);
        let scale = 10f64.powi(decimals as i32);
        (value * scale).round() / scale
    }

    /// Fair coin flip
    pub fn coin(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// Lowercase hex string of `bytes` random bytes
    pub fn hex(&mut self, bytes: usize) -> String {
        let mut buf = vec![0u8; bytes];
        self.rng.fill_bytes(&mut buf);
        hex::encode(buf)
    }

    /// Random (version 4) UUID
    pub fn uuid(&mut self) -> uuid::Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    /// Between `min` and `max` distinct elements of `items`, in random order
    pub fn subset<'a, T>(&mut self, items: &'a [T], min: usize, max: usize) -> Vec<&'a T> {
        let max = max.min(items.len());
        let min = min.min(max);
        let amount = self.int(min, max);
        self.distinct_indices(items.len(), amount)
            .into_iter()
            .map(|i| &items[i])
            .collect()
    }

    /// `amount` distinct indices in `[0, length)`
    pub fn distinct_indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        index::sample(&mut self.rng, length, amount.min(length)).into_vec()
    }

    /// Epoch seconds of a uniform instant in the `window_ms` before `now_ms`
    pub fn seconds_within(&mut self, now_ms: i64, window_ms: i64) -> i64 {
        let back = self.int(0, window_ms.max(0));
        (now_ms - back).div_euclid(1000)
    }
}
