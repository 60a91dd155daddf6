//! Run timeline and the out-of-order index set

use super::random::RandomSource;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Timestamp window of a run.
///
/// `now_ms` is captured once; record `i` nominally lands at
/// `start_ms + i * step_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    now_ms: i64,
    start_ms: i64,
    step_ms: i64,
}

impl Timeline {
    pub fn new(now_ms: i64, lookback_days: u32, total_rows: u64) -> Self {
        let range_ms = i64::from(lookback_days) * DAY_MS;
        let step_ms = match i64::try_from(total_rows) {
            Ok(total) if total > 0 => range_ms / total,
            _ => 0,
        };
        Self {
            now_ms,
            start_ms: now_ms - range_ms,
            step_ms,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    /// Nominal (in-order) timestamp of index `i`, never past `now_ms`
    pub fn nominal(&self, i: u64) -> i64 {
        let offset = i64::try_from(i)
            .ok()
            .and_then(|i| i.checked_mul(self.step_ms))
            .unwrap_or(i64::MAX);
        self.clamp(self.start_ms.saturating_add(offset))
    }

    /// Clamp a timestamp into `[start_ms, now_ms]`
    pub fn clamp(&self, ts: i64) -> i64 {
        ts.clamp(self.start_ms, self.now_ms)
    }
}

/// Indices whose timestamp gets perturbed.
///
/// Exactly `floor(total_rows * fraction)` distinct indices in
/// `[0, total_rows)`, drawn once per run.
#[derive(Debug, Clone, Default)]
pub struct DisorderSet {
    sorted: Vec<u64>,
}

impl DisorderSet {
    pub fn draw(total_rows: u64, fraction: f64, rng: &mut RandomSource) -> Self {
        let amount = ((total_rows as f64) * fraction.clamp(0.0, 1.0)).floor() as u64;
        let amount = amount.min(total_rows);
        let mut sorted: Vec<u64> = rng
            .distinct_indices(total_rows as usize, amount as usize)
            .into_iter()
            .map(|i| i as u64)
            .collect();
        sorted.sort_unstable();
        Self { sorted }
    }

    pub fn contains(&self, i: u64) -> bool {
        self.sorted.binary_search(&i).is_ok()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.sorted.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_default_timeline() {
        let timeline = Timeline::new(NOW, 30, 2_000_000);
        assert_eq!(timeline.start_ms(), NOW - 30 * DAY_MS);
        assert_eq!(timeline.step_ms(), 30 * DAY_MS / 2_000_000);
        assert_eq!(timeline.nominal(0), timeline.start_ms());
        assert!(timeline.nominal(1_999_999) <= NOW);
    }

    #[test]
    fn test_zero_rows() {
        let timeline = Timeline::new(NOW, 30, 0);
        assert_eq!(timeline.step_ms(), 0);
        assert_eq!(timeline.nominal(5), timeline.start_ms());
    }

    #[test]
    fn test_clamp() {
        let timeline = Timeline::new(NOW, 1, 10);
        assert_eq!(timeline.clamp(NOW + 1), NOW);
        assert_eq!(timeline.clamp(0), NOW - DAY_MS);
        assert_eq!(timeline.nominal(u64::MAX), NOW);
    }

    #[test]
    fn test_disorder_set_size() {
        let mut rng = RandomSource::seeded(9);
        let set = DisorderSet::draw(10_000, 0.01, &mut rng);
        assert_eq!(set.len(), 100);
        assert!(set.iter().all(|i| i < 10_000));

        let mut distinct: Vec<u64> = set.iter().collect();
        distinct.dedup();
        assert_eq!(distinct.len(), 100);
    }

    #[test]
    fn test_disorder_set_floor() {
        let mut rng = RandomSource::seeded(9);
        assert_eq!(DisorderSet::draw(150, 0.01, &mut rng).len(), 1);
        assert!(DisorderSet::draw(99, 0.01, &mut rng).is_empty());
        assert!(DisorderSet::draw(0, 0.5, &mut rng).is_empty());
        assert_eq!(DisorderSet::draw(10, 1.0, &mut rng).len(), 10);
    }

    #[test]
    fn test_disorder_set_contains() {
        let mut rng = RandomSource::seeded(10);
        let set = DisorderSet::draw(1000, 0.1, &mut rng);
        for i in set.iter() {
            assert!(set.contains(i));
        }
        let misses = (0..1000).filter(|i| !set.contains(*i)).count();
        assert_eq!(misses, 900);
    }
}
