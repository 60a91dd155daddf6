//! Sink abstraction
//!
//! A [`Sink`] hands out short-lived [`SinkConnection`]s. The insert executor
//! opens one connection per attempt, streams a single batch through it and
//! closes it, whatever the outcome. Adapters report failures as a
//! [`SinkError`](crate::error::SinkError) with a closed
//! [`SinkErrorKind`](crate::error::SinkErrorKind); everything above this
//! module only ever inspects the kind.

pub mod clickhouse;
pub mod stdout;
pub mod testing;

use crate::config::SinkConfig;
use crate::error::SinkResult;
use crate::stream::RowStream;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use self::clickhouse::{ClickHouseSink, ClickHouseSinkConfig};
pub use self::stdout::{StdoutSink, StdoutSinkConfig};

/// Wire format rows are encoded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    /// One JSON object per line
    #[default]
    JsonEachRow,
}

impl RowFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonEachRow => "JSONEachRow",
        }
    }
}

impl fmt::Display for RowFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgment of a successful insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Rows pulled from the stream and acknowledged
    pub rows: u64,
    /// Server-side query id, when the sink reports one
    pub query_id: Option<String>,
}

/// Target of a bulk load
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open a fresh connection. Never returns a pooled one.
    async fn connect(&self) -> SinkResult<Box<dyn SinkConnection>>;

    /// Advisory post-load command for the operator (never executed)
    fn maintenance_hint(&self, _table: &str) -> Option<String> {
        None
    }
}

/// A connection owned by exactly one insert attempt
#[async_trait]
pub trait SinkConnection: Send {
    /// Drain `rows` into `table` and wait for the acknowledgment
    async fn insert(
        &mut self,
        table: &str,
        rows: RowStream,
        format: RowFormat,
    ) -> SinkResult<InsertSummary>;

    /// Release the connection. Must be safe after a failed insert.
    async fn close(self: Box<Self>);
}

/// Build the sink selected by the configuration
pub fn from_config(config: &SinkConfig, batch_size: u64) -> Arc<dyn Sink> {
    match config {
        SinkConfig::Clickhouse(c) => Arc::new(ClickHouseSink::new(c.clone(), batch_size)),
        SinkConfig::Stdout(c) => Arc::new(StdoutSink::new(c.clone())),
    }
}
