//! In-memory sink for tests
//!
//! Records every insert attempt (table, offset, delivered rows, outcome) and
//! every connection opened and closed. Failures can be scripted per insert
//! attempt, optionally after part of the batch has already been delivered,
//! which is how a mid-stream connection reset looks from the loader's side.
//!
//! ```rust,ignore
//! let sink = Arc::new(
//!     MockSink::new().fail_insert(2, 10, SinkError::connection_reset("ECONNRESET")),
//! );
//! let report = Loader::new(config, sink.clone())?.run().await?;
//! assert_eq!(sink.connections_opened(), sink.connections_closed());
//! ```

use super::{InsertSummary, RowFormat, Sink, SinkConnection};
use crate::error::{SinkError, SinkResult};
use crate::stream::RowStream;
use crate::synth::Record;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One recorded insert attempt
#[derive(Debug, Clone)]
pub struct MockInsert {
    /// 1-based attempt number across the whole run
    pub attempt: usize,
    pub table: String,
    /// Logical index of the first row of the batch
    pub offset: u64,
    /// Rows that reached the sink, even when the attempt failed
    pub rows: Vec<Record>,
    pub succeeded: bool,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    after_rows: u64,
    error: SinkError,
}

#[derive(Debug, Default)]
struct MockState {
    inserts: Vec<MockInsert>,
    insert_failures: HashMap<usize, ScriptedFailure>,
    connect_failures: HashMap<usize, SinkError>,
    connect_attempts: usize,
    opened: usize,
    closed: usize,
}

/// A mock sink for testing
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<MockState>>,
    hint: Option<String>,
}

impl MockSink {
    /// Create a mock sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`-th insert (1-based) after delivering `after_rows` rows
    pub fn fail_insert(self, attempt: usize, after_rows: u64, error: SinkError) -> Self {
        self.state
            .lock()
            .insert_failures
            .insert(attempt, ScriptedFailure { after_rows, error });
        self
    }

    /// Fail the `attempt`-th connect call (1-based)
    pub fn fail_connect(self, attempt: usize, error: SinkError) -> Self {
        self.state.lock().connect_failures.insert(attempt, error);
        self
    }

    /// Report a maintenance hint after the load
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Every insert attempt in order
    pub fn inserts(&self) -> Vec<MockInsert> {
        self.state.lock().inserts.clone()
    }

    /// Offsets of all insert attempts, in order
    pub fn attempt_offsets(&self) -> Vec<u64> {
        self.state.lock().inserts.iter().map(|i| i.offset).collect()
    }

    /// Offsets of successful inserts, in order
    pub fn committed_offsets(&self) -> Vec<u64> {
        self.state
            .lock()
            .inserts
            .iter()
            .filter(|i| i.succeeded)
            .map(|i| i.offset)
            .collect()
    }

    /// Rows from successful inserts
    pub fn committed_rows(&self) -> Vec<Record> {
        self.state
            .lock()
            .inserts
            .iter()
            .filter(|i| i.succeeded)
            .flat_map(|i| i.rows.iter().cloned())
            .collect()
    }

    /// Every row that reached the sink, including partial deliveries
    pub fn delivered_rows(&self) -> Vec<Record> {
        self.state
            .lock()
            .inserts
            .iter()
            .flat_map(|i| i.rows.iter().cloned())
            .collect()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn connections_closed(&self) -> usize {
        self.state.lock().closed
    }
}

#[async_trait]
impl Sink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> SinkResult<Box<dyn SinkConnection>> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        let attempt = state.connect_attempts;
        if let Some(err) = state.connect_failures.remove(&attempt) {
            return Err(err);
        }
        state.opened += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn maintenance_hint(&self, _table: &str) -> Option<String> {
        self.hint.clone()
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SinkConnection for MockConnection {
    async fn insert(
        &mut self,
        table: &str,
        mut rows: RowStream,
        _format: RowFormat,
    ) -> SinkResult<InsertSummary> {
        let offset = rows.offset();
        let (attempt, failure) = {
            let mut state = self.state.lock();
            let attempt = state.inserts.len() + 1;
            state.inserts.push(MockInsert {
                attempt,
                table: table.to_string(),
                offset,
                rows: Vec::new(),
                succeeded: false,
            });
            (attempt, state.insert_failures.remove(&attempt))
        };

        let limit = failure.as_ref().map(|f| f.after_rows);
        let mut delivered = Vec::new();
        while limit.map_or(true, |l| (delivered.len() as u64) < l) {
            match rows.next().await {
                Some(record) => delivered.push(record),
                None => break,
            }
        }

        let count = delivered.len() as u64;
        let mut state = self.state.lock();
        let entry = &mut state.inserts[attempt - 1];
        entry.rows = delivered;

        match failure {
            Some(f) => Err(f.error),
            None => {
                entry.succeeded = true;
                Ok(InsertSummary {
                    rows: count,
                    query_id: Some(format!("mock-{}", attempt)),
                })
            }
        }
    }

    async fn close(self: Box<Self>) {
        self.state.lock().closed += 1;
    }
}
