use super::pools::{self, SG_KEYS};
use super::random::RandomSource;
use super::record::{Campaign, CustomProperty, Record, SessionGroup, UserProfile};
use super::timeline::{DisorderSet, Timeline};
use crate::config::GeneratorConfig;
use crate::error::{LoaderError, Result};

const PROFILE_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;
const SG_MIN_KEYS: usize = 15;
const SG_MAX_KEYS: usize = 20;
const ID_HEX_BYTES: usize = 20;

/// Produces the record for any logical index.
///
/// Built once per run and immutable afterwards. Only `uid` and `ts` depend on
/// the index; everything else is drawn from the caller's [`RandomSource`].
#[derive(Debug)]
pub struct RecordSynthesizer {
    app_id: String,
    seed: u64,
    total_rows: u64,
    uid_pool: u64,
    timeline: Timeline,
    disorder: DisorderSet,
}

impl RecordSynthesizer {
    pub fn new(config: &GeneratorConfig, seed: u64, now_ms: i64) -> Result<Self> {
        if usize::try_from(config.total_rows).is_err() {
            return Err(LoaderError::config(format!(
                "total_rows {} exceeds the addressable range",
                config.total_rows
            )));
        }

        let total_rows = config.total_rows;
        let timeline = Timeline::new(now_ms, config.lookback_days, total_rows);
        let mut rng = RandomSource::seeded(seed);
        let disorder = DisorderSet::draw(total_rows, config.disorder_fraction, &mut rng);
        let uid_pool =
            (((total_rows as f64) * config.uid_pool_fraction.clamp(0.0, 1.0)).floor() as u64).max(1);

        Ok(Self {
            app_id: config.app_id.clone(),
            seed,
            total_rows,
            uid_pool,
            timeline,
            disorder,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn uid_pool(&self) -> u64 {
        self.uid_pool
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn disorder(&self) -> &DisorderSet {
        &self.disorder
    }

    /// Event timestamp for index `i`.
    ///
    /// Out-of-order indices get a uniform offset in `[-2 step, +2 step]`,
    /// clamped to the run window.
    pub fn timestamp_for(&self, i: u64, rng: &mut RandomSource) -> i64 {
        let nominal = self.timeline.nominal(i);
        if !self.disorder.contains(i) {
            return nominal;
        }
        let spread = self.timeline.step_ms().saturating_mul(2);
        let jitter = rng.int(-spread, spread);
        self.timeline.clamp(nominal.saturating_add(jitter))
    }

    pub fn uid_for(&self, i: u64) -> u64 {
        i % self.uid_pool
    }

    /// Synthesize the record for index `i`
    pub fn generate(&self, i: u64, rng: &mut RandomSource) -> Record {
        let ts = self.timestamp_for(i, rng);
        let uid = self.uid_for(i);
        let id = format!("{}_{}_{}", rng.hex(ID_HEX_BYTES), uid, ts);

        let sg = self.session_group(&id, rng);
        let (key, value) = *rng.pick(pools::CUSTOM_PROPERTIES);

        Record {
            a: self.app_id.clone(),
            e: *rng.pick(pools::EVENT_TYPES),
            uid,
            did: rng.uuid(),
            lsid: id.clone(),
            id,
            ts,
            up: self.user_profile(rng),
            custom: CustomProperty { key, value },
            cmp: Campaign {
                c: *rng.pick(pools::CAMPAIGN_CHANNELS),
            },
            sg,
            c: rng.int(1, 5),
            s: rng.float(0.0, 1.0, 6),
            dur: rng.int(100, 90_000),
        }
    }

    fn session_group(&self, id: &str, rng: &mut RandomSource) -> SessionGroup {
        let keys: &'static [String] = &SG_KEYS;
        let entries = rng
            .subset(keys, SG_MIN_KEYS, SG_MAX_KEYS)
            .into_iter()
            .map(|key| (key.as_str(), *rng.pick(pools::SAMPLE_WORDS)))
            .collect();

        SessionGroup {
            entries,
            request_id: id.to_string(),
            postfix: *rng.pick(pools::POSTFIXES),
            ended: rng.coin(),
        }
    }

    fn user_profile(&self, rng: &mut RandomSource) -> UserProfile {
        let now_ms = self.timeline.now_ms();
        let browser = *rng.pick(pools::BROWSERS);

        UserProfile {
            fs: rng.seconds_within(now_ms, PROFILE_WINDOW_MS),
            ls: rng.seconds_within(now_ms, PROFILE_WINDOW_MS),
            sc: rng.int(1, 3),
            d: *rng.pick(pools::PLATFORMS),
            cty: pools::UNKNOWN,
            rgn: pools::UNKNOWN,
            cc: *rng.pick(pools::COUNTRY_CODES),
            p: *rng.pick(pools::OS_NAMES),
            pv: format!("o{}:{}", rng.int(10, 13), rng.int(0, 5)),
            av: format!("{}:{}:{}", rng.int(1, 6), rng.int(0, 10), rng.int(0, 10)),
            c: pools::UNKNOWN,
            r: *rng.pick(pools::RESOLUTIONS),
            brw: browser,
            brwv: format!("[{}]_{}:0:0:0", browser, rng.int(100, 140)),
            la: *rng.pick(pools::LANGUAGE_CODES),
            src: *rng.pick(pools::SOURCES),
            src_ch: *rng.pick(pools::SOURCE_CHANNELS),
            lv: *rng.pick(pools::VIEW_NAMES),
            hour: rng.int(0, 23),
            dow: rng.int(0, 6),
        }
    }

    /// Random source for the batch starting at `offset`.
    ///
    /// Derived from the run seed only, so every attempt at the same batch
    /// regenerates identical rows.
    pub fn batch_rng(&self, offset: u64) -> RandomSource {
        RandomSource::seeded(splitmix64(self.seed ^ splitmix64(offset)))
    }

    /// The first `n` records (capped at `total_rows`)
    pub fn sample(&self, n: u64) -> Vec<Record> {
        let mut rng = self.batch_rng(0);
        (0..n.min(self.total_rows))
            .map(|i| self.generate(i, &mut rng))
            .collect()
    }
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
