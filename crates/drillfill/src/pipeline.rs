//! Load driver
//!
//! Runs batches strictly one after another:
//!
//! ```text
//! Init → (GenerateBatch → InsertWithRetry → AdvanceProgress → [Throttle])* → Complete
//!                               │
//!                               └─ fatal error → Aborted
//! ```
//!
//! Progress only advances after the sink acknowledged a batch. A fatal error
//! stops the run; nothing after the failing batch is attempted.

use crate::batch::{BatchPlan, Progress, ProgressTracker};
use crate::config::LoaderConfig;
use crate::error::Result;
use crate::executor::InsertExecutor;
use crate::retry::RetryPolicy;
use crate::sink::Sink;
use crate::stream::RowSource;
use crate::synth::{RandomSource, RecordSynthesizer};
use crate::throttle::ThrottleController;
use metrics::{counter, histogram};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// Where the loader is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Init,
    GenerateBatch,
    InsertWithRetry,
    AdvanceProgress,
    Throttle,
    Complete,
    Aborted,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::GenerateBatch => "generate_batch",
            Self::InsertWithRetry => "insert_with_retry",
            Self::AdvanceProgress => "advance_progress",
            Self::Throttle => "throttle",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows_inserted: u64,
    pub batches: u64,
    /// Insert attempts across all batches
    pub attempts: u64,
    /// Attempts beyond the first, across all batches
    pub retries: u64,
    pub throttle_pauses: u64,
    pub elapsed: Duration,
    /// Seed the run was generated with; replays the same data
    pub seed: u64,
    pub state: LoaderState,
    /// Advisory post-load command, never executed
    pub maintenance_hint: Option<String>,
}

/// Bulk loader
pub struct Loader {
    sink: Arc<dyn Sink>,
    table: String,
    synth: Arc<RecordSynthesizer>,
    plan: BatchPlan,
    executor: InsertExecutor,
    throttle: ThrottleController,
    state: LoaderState,
}

impl Loader {
    /// Validate `config` and prepare a run against `sink`
    pub fn new(config: LoaderConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        Self::new_at(config, sink, chrono::Utc::now().timestamp_millis())
    }

    /// Like [`Loader::new`] with an explicit run clock (epoch ms)
    pub fn new_at(config: LoaderConfig, sink: Arc<dyn Sink>, now_ms: i64) -> Result<Self> {
        config.validate_all()?;

        let seed = config
            .generator
            .seed
            .unwrap_or_else(RandomSource::entropy_seed);
        let synth = Arc::new(RecordSynthesizer::new(&config.generator, seed, now_ms)?);
        let plan = BatchPlan::new(
            config.generator.total_rows,
            config.batch.size,
            config.batch.remainder,
        )?;
        let table = config.sink.table().to_string();
        let executor = InsertExecutor::new(
            Arc::clone(&sink),
            table.clone(),
            RetryPolicy::from(&config.retry),
        );

        Ok(Self {
            sink,
            table,
            synth,
            plan,
            executor,
            throttle: ThrottleController::from(&config.throttle),
            state: LoaderState::Init,
        })
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    pub fn synthesizer(&self) -> &Arc<RecordSynthesizer> {
        &self.synth
    }

    pub fn seed(&self) -> u64 {
        self.synth.seed()
    }

    /// Load every batch
    pub async fn run(&mut self) -> Result<LoadReport> {
        self.run_with_progress(|_| {}).await
    }

    /// Load every batch, calling `on_progress` after each acknowledged one
    pub async fn run_with_progress<F>(&mut self, mut on_progress: F) -> Result<LoadReport>
    where
        F: FnMut(&Progress),
    {
        let started = Instant::now();
        let plan = self.plan;
        let mut tracker = ProgressTracker::new(plan.total_rows());
        let mut attempts = 0u64;
        let mut retries = 0u64;
        let mut throttle_pauses = 0u64;

        info!(
            sink = self.sink.name(),
            table = %self.table,
            seed = self.synth.seed(),
            total_rows = plan.total_rows(),
            batch_size = plan.batch_size(),
            batches = plan.batch_count(),
            "Starting load"
        );

        for span in plan.spans() {
            self.state = LoaderState::GenerateBatch;
            let source = RowSource::new(Arc::clone(&self.synth), span);

            self.state = LoaderState::InsertWithRetry;
            let batch_span = info_span!(
                "batch",
                index = span.index,
                offset = span.offset,
                rows = span.rows
            );
            let outcome = match self
                .executor
                .insert_batch(&source)
                .instrument(batch_span)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.state = LoaderState::Aborted;
                    error!(
                        offset = span.offset,
                        rows_inserted = tracker.current().rows_inserted,
                        "Load aborted: {}",
                        e
                    );
                    return Err(e);
                }
            };

            self.state = LoaderState::AdvanceProgress;
            attempts += u64::from(outcome.attempts);
            retries += u64::from(outcome.retries());
            counter!("drillfill.batches.success").increment(1);
            counter!("drillfill.rows.inserted").increment(span.rows);
            histogram!("drillfill.batch.duration_ms").record(outcome.elapsed.as_millis() as f64);

            let progress = tracker.advance(span.rows);
            info!(
                rows_inserted = progress.rows_inserted,
                total_rows = progress.total_rows,
                attempts = outcome.attempts,
                "✔ {} / {} inserted ({:.1}%)",
                progress.rows_inserted,
                progress.total_rows,
                progress.percent()
            );
            on_progress(&progress);

            self.state = LoaderState::Throttle;
            if self
                .throttle
                .on_progress(progress.rows_inserted, progress.total_rows)
                .await
            {
                throttle_pauses += 1;
            }
        }

        self.state = LoaderState::Complete;
        let progress = tracker.current();
        let report = LoadReport {
            rows_inserted: progress.rows_inserted,
            batches: progress.batches_completed,
            attempts,
            retries,
            throttle_pauses,
            elapsed: started.elapsed(),
            seed: self.synth.seed(),
            state: self.state,
            maintenance_hint: self.sink.maintenance_hint(&self.table),
        };

        info!(
            rows_inserted = report.rows_inserted,
            batches = report.batches,
            retries = report.retries,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Ingestion complete"
        );
        Ok(report)
    }
}
