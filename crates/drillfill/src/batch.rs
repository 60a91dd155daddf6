//! Batch sequencing
//!
//! Splits `[0, total_rows)` into contiguous, fixed-size spans and keeps the
//! running progress count.
//!
//! ```rust,ignore
//! let plan = BatchPlan::new(100, 25, RemainderPolicy::Short)?;
//! let mut progress = ProgressTracker::new(plan.total_rows());
//!
//! for span in plan.spans() {
//!     executor.insert_batch(&RowSource::new(synth.clone(), span)).await?;
//!     let p = progress.advance(span.rows);
//!     println!("{} / {}", p.rows_inserted, p.total_rows);
//! }
//! ```

use crate::error::{LoaderError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Handling of a `total_rows` that is not a multiple of the batch size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// The last batch carries the remainder
    #[default]
    Short,
    /// Refuse the configuration
    Reject,
}

/// A contiguous range of logical record indices inserted as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSpan {
    /// Zero-based batch number
    pub index: u64,
    /// First logical index
    pub offset: u64,
    /// Number of rows
    pub rows: u64,
}

impl BatchSpan {
    /// One past the last logical index
    pub fn end(&self) -> u64 {
        self.offset + self.rows
    }
}

/// Immutable partition of the dataset into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total_rows: u64,
    batch_size: u64,
}

impl BatchPlan {
    pub fn new(total_rows: u64, batch_size: u64, remainder: RemainderPolicy) -> Result<Self> {
        if batch_size == 0 {
            return Err(LoaderError::config("batch size must be greater than 0"));
        }
        if remainder == RemainderPolicy::Reject && total_rows % batch_size != 0 {
            return Err(LoaderError::config(format!(
                "total_rows {} is not a multiple of batch size {} (remainder policy: reject)",
                total_rows, batch_size
            )));
        }
        Ok(Self {
            total_rows,
            batch_size,
        })
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn batch_count(&self) -> u64 {
        self.total_rows.div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    /// Rows in the final batch
    pub fn last_batch_rows(&self) -> u64 {
        match self.total_rows % self.batch_size {
            0 if self.total_rows > 0 => self.batch_size,
            rem => rem,
        }
    }

    /// Batches in increasing offset order
    pub fn spans(&self) -> impl Iterator<Item = BatchSpan> + '_ {
        (0..self.batch_count()).map(move |index| {
            let offset = index * self.batch_size;
            BatchSpan {
                index,
                offset,
                rows: self.batch_size.min(self.total_rows - offset),
            }
        })
    }
}

/// Snapshot of run progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub rows_inserted: u64,
    pub total_rows: u64,
    pub batches_completed: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        self.rows_inserted as f64 * 100.0 / self.total_rows as f64
    }

    pub fn is_complete(&self) -> bool {
        self.rows_inserted >= self.total_rows
    }
}

/// Running count of acknowledged rows
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_rows: u64,
    rows_inserted: u64,
    batches_completed: u64,
}

impl ProgressTracker {
    pub fn new(total_rows: u64) -> Self {
        Self {
            total_rows,
            rows_inserted: 0,
            batches_completed: 0,
        }
    }

    /// Record one acknowledged batch
    pub fn advance(&mut self, rows: u64) -> Progress {
        self.rows_inserted += rows;
        self.batches_completed += 1;
        self.current()
    }

    pub fn current(&self) -> Progress {
        Progress {
            rows_inserted: self.rows_inserted,
            total_rows: self.total_rows,
            batches_completed: self.batches_completed,
        }
    }
}
