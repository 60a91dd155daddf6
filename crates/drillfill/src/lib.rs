//! drillfill - synthetic drill-event bulk loader for ClickHouse
//!
//! Generates realistic event-analytics records and streams them into a
//! ClickHouse table in fixed-size batches, with periodic throttling and
//! transparent recovery from transient server and network failures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ pipeline::Loader          plan → insert → progress → throttle│
//! ├──────────────────────────────────────────────────────────────┤
//! │ executor::InsertExecutor  fresh connection + stream/attempt  │
//! │ retry::RetryPolicy        fixed delay, retryable vs fatal    │
//! │ throttle::Throttle...     pause at exact row multiples       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ batch::BatchPlan          contiguous spans of indices        │
//! │ stream::RowSource         lazy, re-creatable row streams     │
//! │ synth::RecordSynthesizer  record for any logical index       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ sink::{clickhouse, stdout, testing}                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Delivery guarantee
//!
//! Delivery is **at-least-once**. When an insert fails mid-stream, rows
//! already sent may have been committed by the server before the failure
//! surfaced. The executor retries the whole batch, so those rows can appear
//! twice. Each batch regenerates from a seed derived from the run seed and
//! the batch offset, so duplicates are exact copies and can be collapsed
//! afterwards (e.g. `OPTIMIZE ... FINAL` on a `ReplacingMergeTree`).
//!
//! Progress only counts acknowledged batches; a run is never resumed across
//! process restarts.
//!
//! # Library usage
//!
//! ```rust,ignore
//! use drillfill::{config::LoaderConfig, pipeline::Loader, sink};
//!
//! let config = LoaderConfig::from_file("drillfill.yaml".as_ref())?;
//! let sink = sink::from_config(&config.sink, config.batch.size);
//! let report = Loader::new(config, sink)?.run().await?;
//! println!("{} rows in {:?}", report.rows_inserted, report.elapsed);
//! ```
//!
//! # CLI usage
//!
//! ```bash
//! # Load with defaults (2M rows into countly_drill.drill_events)
//! drillfill -c drillfill.yaml run
//!
//! # Print generated rows instead of inserting
//! drillfill run --dry-run --rows 100
//!
//! # Check connectivity and the target table
//! drillfill -c drillfill.yaml check
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod stream;
pub mod synth;
pub mod throttle;
pub mod types;

pub use config::LoaderConfig;
pub use error::{LoaderError, Result, SinkError, SinkErrorKind};
pub use pipeline::{LoadReport, Loader, LoaderState};
