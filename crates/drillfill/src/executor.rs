//! Resilient batch insert
//!
//! One call to [`InsertExecutor::insert_batch`] delivers one batch. Each
//! attempt opens a fresh sink connection, drains a fresh row stream into it
//! and closes the connection whatever the outcome. Retryable failures are
//! logged and retried after the policy's delay; fatal failures are returned
//! immediately.
//!
//! Rows streamed during a failed attempt may already be durable in the sink,
//! so a retried batch can produce duplicates (at-least-once delivery). Because
//! the row stream regenerates deterministically, the duplicates are exact
//! copies.

use crate::error::{LoaderError, Result, SinkError};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::sink::{InsertSummary, RowFormat, Sink};
use crate::stream::{RowSource, RowStream};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Result of a delivered batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Attempts it took, including the successful one
    pub attempts: u32,
    /// Rows acknowledged by the sink
    pub rows: u64,
    /// Time from the first attempt to the acknowledgment, including delays
    pub elapsed: Duration,
    /// Server-side id of the successful insert, if reported
    pub query_id: Option<String>,
}

impl BatchOutcome {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Inserts batches into a fixed table with retry
pub struct InsertExecutor {
    sink: Arc<dyn Sink>,
    table: String,
    format: RowFormat,
    policy: RetryPolicy,
}

impl InsertExecutor {
    pub fn new(sink: Arc<dyn Sink>, table: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            sink,
            table: table.into(),
            format: RowFormat::JsonEachRow,
            policy,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one batch, retrying transient failures
    pub async fn insert_batch(&self, source: &RowSource) -> Result<BatchOutcome> {
        let span = source.span();
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let rows = source.open();
            let streamed = rows.streamed();

            let err = match self.attempt(rows).await {
                Ok(summary) => {
                    debug!(
                        offset = span.offset,
                        attempt,
                        rows = summary.rows,
                        "Batch acknowledged"
                    );
                    return Ok(BatchOutcome {
                        attempts: attempt,
                        rows: summary.rows,
                        elapsed: started.elapsed(),
                        query_id: summary.query_id,
                    });
                }
                Err(err) => err,
            };

            match self.policy.decide(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    counter!("drillfill.batches.retried").increment(1);
                    warn!(
                        offset = span.offset,
                        attempt,
                        error_kind = %err.kind,
                        error_code = ?err.code,
                        rows_streamed = streamed.get(),
                        delay_ms = delay.as_millis() as u64,
                        "Retryable insert error, retrying in {:?}: {}",
                        delay,
                        err.message
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    counter!("drillfill.batches.failed").increment(1);
                    error!(
                        offset = span.offset,
                        attempt,
                        error_kind = %err.kind,
                        error_code = ?err.code,
                        rows_streamed = streamed.get(),
                        "Insert failed: {}",
                        err.message
                    );
                    return Err(if self.policy.is_retryable(&err) {
                        LoaderError::RetriesExhausted {
                            offset: span.offset,
                            attempts: attempt,
                            source: err,
                        }
                    } else {
                        LoaderError::Insert {
                            offset: span.offset,
                            source: err,
                        }
                    });
                }
            }
        }
    }

    /// One attempt on a fresh connection
    async fn attempt(&self, rows: RowStream) -> std::result::Result<InsertSummary, SinkError> {
        let mut conn = self.sink.connect().await?;
        let result = conn.insert(&self.table, rows, self.format).await;
        conn.close().await;
        result
    }
}
