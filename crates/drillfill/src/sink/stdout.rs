//! Stdout sink
//!
//! Writes every row as one JSON line to stdout. Used for dry runs and for
//! piping generated data into other tools.

use super::{InsertSummary, RowFormat, Sink, SinkConnection};
use crate::error::{SinkError, SinkResult};
use crate::stream::RowStream;
use async_trait::async_trait;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use validator::Validate;

/// Stdout sink configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct StdoutSinkConfig {
    /// Table name reported in logs
    #[serde(default = "default_table")]
    #[validate(length(min = 1, max = 255))]
    pub table: String,

    /// Pretty-print each row instead of one line per row
    #[serde(default)]
    pub pretty: bool,
}

fn default_table() -> String {
    "drill_events".to_string()
}

impl Default for StdoutSinkConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            pretty: false,
        }
    }
}

/// Stdout Sink implementation
#[derive(Debug, Clone, Default)]
pub struct StdoutSink {
    config: StdoutSinkConfig,
}

impl StdoutSink {
    pub fn new(config: StdoutSinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn connect(&self) -> SinkResult<Box<dyn SinkConnection>> {
        Ok(Box::new(StdoutConnection {
            pretty: self.config.pretty,
        }))
    }
}

struct StdoutConnection {
    pretty: bool,
}

#[async_trait]
impl SinkConnection for StdoutConnection {
    async fn insert(
        &mut self,
        _table: &str,
        rows: RowStream,
        format: RowFormat,
    ) -> SinkResult<InsertSummary> {
        let RowFormat::JsonEachRow = format;
        let written = write_rows(tokio::io::stdout(), rows, self.pretty).await?;
        Ok(InsertSummary {
            rows: written,
            query_id: None,
        })
    }

    async fn close(self: Box<Self>) {}
}

/// Write each row as JSON followed by a newline; returns rows written
async fn write_rows<W>(writer: W, mut rows: RowStream, pretty: bool) -> SinkResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(writer);
    let mut written = 0u64;
    while let Some(record) = rows.next().await {
        let mut line = if pretty {
            serde_json::to_vec_pretty(&record)
        } else {
            serde_json::to_vec(&record)
        }
        .map_err(|e| SinkError::malformed(format!("Failed to encode row: {}", e)))?;
        line.push(b'\n');
        out.write_all(&line).await?;
        written += 1;
    }
    out.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchSpan;
    use crate::config::GeneratorConfig;
    use crate::stream::RowSource;
    use crate::synth::RecordSynthesizer;
    use std::sync::Arc;

    fn rows(n: u64) -> RowStream {
        let config = GeneratorConfig {
            total_rows: n,
            ..Default::default()
        };
        let synth = Arc::new(RecordSynthesizer::new(&config, 3, 1_700_000_000_000).unwrap());
        RowSource::new(
            synth,
            BatchSpan {
                index: 0,
                offset: 0,
                rows: n,
            },
        )
        .open()
    }

    #[tokio::test]
    async fn test_write_json_lines() {
        let mut buf = Vec::new();
        let written = write_rows(&mut buf, rows(5), false).await.unwrap();
        assert_eq!(written, 5);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("_id").is_some());
        }
    }

    #[tokio::test]
    async fn test_write_pretty() {
        let mut buf = Vec::new();
        write_rows(&mut buf, rows(1), true).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().count() > 1);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["a"], "APP_ID");
    }

    #[test]
    fn test_default_config() {
        let config = StdoutSinkConfig::default();
        assert_eq!(config.table, "drill_events");
        assert!(!config.pretty);
        assert!(config.validate().is_ok());
    }
}
