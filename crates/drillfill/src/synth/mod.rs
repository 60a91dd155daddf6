//! Record synthesis
//!
//! Generates drill events on demand for any logical index in
//! `[0, total_rows)`. Nothing is materialized: a batch stream calls
//! [`RecordSynthesizer::generate`] once per pulled row with a random source
//! derived from the run seed and the batch offset.
//!
//! - `uid = i mod uid_pool`, `uid_pool = max(1, floor(total_rows * uid_pool_fraction))`
//! - `ts = start + i * step`, except for the disorder set, which is jittered
//!   by up to two steps and clamped to `[start, now]`

mod generator;
pub mod pools;
mod random;
mod record;
mod timeline;

pub use generator::RecordSynthesizer;
pub use random::RandomSource;
pub use record::{Campaign, CustomProperty, Record, SessionGroup, UserProfile};
pub use timeline::{DisorderSet, Timeline};
