//! ClickHouse sink
//!
//! Streams batches into ClickHouse over the HTTP interface as `JSONEachRow`.
//!
//! # Connections
//!
//! Every [`Sink::connect`] builds a new `reqwest::Client` with idle pooling
//! disabled, so no socket survives an attempt. A connection that saw a reset
//! is never handed to the next attempt.
//!
//! # Insert settings
//!
//! Sent as query parameters. Defaults (overridable through `settings`):
//!
//! | Setting | Value |
//! |---------|-------|
//! | `async_insert` | 1 |
//! | `wait_for_async_insert` | 1 |
//! | `wait_end_of_query` | 1 |
//! | `optimize_on_insert` | 1 |
//! | `input_format_parallel_parsing` | 1 |
//! | `max_insert_block_size` | batch size |
//!
//! # Error classification
//!
//! | Condition | Kind |
//! |-----------|------|
//! | code 241, 252, 253, `MEMORY_LIMIT_EXCEEDED`, HTTP 503 | `ResourceExhausted` |
//! | code 159, 209, client timeout | `Timeout` |
//! | code 210, reset / broken pipe / aborted / EOF | `ConnectionReset` |
//! | connection refused, DNS failure | `Unreachable` |
//! | code 516, 497, 192, 193, 194, HTTP 401/403 | `Auth` |
//! | code 60, 16, 81, 44 | `Schema` |
//! | code 26, 27, 117, 6, 72, 38 | `Malformed` |
//! | anything else | `Rejected` |

use super::{InsertSummary, RowFormat, Sink, SinkConnection};
use crate::error::{SinkError, SinkErrorKind, SinkResult};
use crate::stream::RowStream;
use crate::types::SensitiveString;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

const EXCEPTION_CODE_HEADER: &str = "x-clickhouse-exception-code";
const QUERY_ID_HEADER: &str = "x-clickhouse-query-id";
const ROWS_PER_CHUNK: usize = 512;
const MAX_MESSAGE_LEN: usize = 2048;

/// ClickHouse sink configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ClickHouseSinkConfig {
    /// ClickHouse HTTP(S) URL (e.g. `http://localhost:8123`)
    #[serde(default = "default_url")]
    #[validate(length(min = 1, max = 2048), url)]
    pub url: String,

    /// Database name
    #[serde(default = "default_database")]
    #[validate(length(min = 1, max = 255))]
    pub database: String,

    /// Target table (must already exist)
    #[serde(default = "default_table")]
    #[validate(length(min = 1, max = 255))]
    pub table: String,

    /// Username for authentication
    #[serde(default = "default_username")]
    #[validate(length(min = 1, max = 255))]
    pub username: String,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<SensitiveString>,

    /// Timeout for a whole insert request, in seconds
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 86_400))]
    pub request_timeout_secs: u64,

    /// Timeout for establishing the TCP connection, in seconds
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1, max = 600))]
    pub connect_timeout_secs: u64,

    /// `max_memory_usage` suggested in the post-load OPTIMIZE hint
    #[serde(default = "default_optimize_max_memory")]
    #[validate(length(min = 1, max = 32))]
    pub optimize_max_memory: String,

    /// Extra ClickHouse settings; override the insert defaults
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "countly_drill".to_string()
}

fn default_table() -> String {
    "drill_events".to_string()
}

fn default_username() -> String {
    "default".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_optimize_max_memory() -> String {
    "20G".to_string()
}

impl Default for ClickHouseSinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            table: default_table(),
            username: default_username(),
            password: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            optimize_max_memory: default_optimize_max_memory(),
            settings: BTreeMap::new(),
        }
    }
}

/// Regex pattern for valid ClickHouse identifiers (database / table names).
/// Permits ASCII alphanumeric, underscore, and dot (for qualified names).
static IDENTIFIER_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]{0,254}$")
        .expect("identifier regex pattern is invalid - this is a bug")
});

/// `Code: 241. DB::Exception: ...`
static EXCEPTION_CODE_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"Code:\s*(\d+)")
        .expect("exception code regex pattern is invalid - this is a bug")
});

impl ClickHouseSinkConfig {
    /// Validate that a database name is safe for inclusion in queries.
    pub fn validate_database_name(name: &str) -> std::result::Result<(), String> {
        if !IDENTIFIER_PATTERN.is_match(name) {
            return Err(format!(
                "Invalid database name '{}': must match [A-Za-z_][A-Za-z0-9_.]*",
                name
            ));
        }
        Ok(())
    }

    /// Validate that a table name is safe for inclusion in queries.
    pub fn validate_table_name(name: &str) -> std::result::Result<(), String> {
        if !IDENTIFIER_PATTERN.is_match(name) {
            return Err(format!(
                "Invalid table name '{}': must match [A-Za-z_][A-Za-z0-9_.]*",
                name
            ));
        }
        Ok(())
    }

    /// Insert settings: the defaults with `settings` layered on top
    pub fn insert_settings(&self, batch_size: u64) -> BTreeMap<String, String> {
        let mut settings: BTreeMap<String, String> = [
            ("async_insert", "1"),
            ("wait_for_async_insert", "1"),
            ("wait_end_of_query", "1"),
            ("optimize_on_insert", "1"),
            ("input_format_parallel_parsing", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        settings.insert("max_insert_block_size".to_string(), batch_size.to_string());
        settings.extend(self.settings.clone());
        settings
    }
}

// ─────────────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────────────

/// Map a ClickHouse server error code to a failure kind
fn kind_for_code(code: u32) -> Option<SinkErrorKind> {
    let kind = match code {
        // MEMORY_LIMIT_EXCEEDED, TOO_MANY_PARTS, part count pressure
        241 | 252 | 253 => SinkErrorKind::ResourceExhausted,
        // TIMEOUT_EXCEEDED, SOCKET_TIMEOUT
        159 | 209 => SinkErrorKind::Timeout,
        // NETWORK_ERROR
        210 => SinkErrorKind::ConnectionReset,
        // AUTHENTICATION_FAILED, ACCESS_DENIED, UNKNOWN_USER, WRONG_PASSWORD, REQUIRED_PASSWORD
        516 | 497 | 192 | 193 | 194 => SinkErrorKind::Auth,
        // UNKNOWN_TABLE, NO_SUCH_COLUMN_IN_TABLE, UNKNOWN_DATABASE, ILLEGAL_COLUMN
        60 | 16 | 81 | 44 => SinkErrorKind::Schema,
        // CANNOT_PARSE_*, INCORRECT_DATA, CANNOT_PARSE_TEXT
        26 | 27 | 117 | 6 | 72 | 38 => SinkErrorKind::Malformed,
        _ => return None,
    };
    Some(kind)
}

fn parse_exception_code(body: &str) -> Option<u32> {
    EXCEPTION_CODE_PATTERN
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn truncate_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_MESSAGE_LEN {
        return trimmed.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Classify an error response from the HTTP interface
fn classify_response(status: StatusCode, header_code: Option<u32>, body: &str) -> SinkError {
    let code = header_code.or_else(|| parse_exception_code(body));
    let kind = code
        .and_then(kind_for_code)
        .or_else(|| {
            body.contains("MEMORY_LIMIT_EXCEEDED")
                .then_some(SinkErrorKind::ResourceExhausted)
        })
        .unwrap_or(match status.as_u16() {
            401 | 403 => SinkErrorKind::Auth,
            503 => SinkErrorKind::ResourceExhausted,
            _ => SinkErrorKind::Rejected,
        });

    let message = match truncate_message(body) {
        m if m.is_empty() => format!("HTTP {}", status),
        m => m,
    };
    let err = SinkError::new(kind, message);
    match code {
        Some(c) => err.with_code(c),
        None => err,
    }
}

/// Failure kind of the first I/O error in a source chain
fn io_kind_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<SinkErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            let kind = SinkErrorKind::from_io(io.kind());
            if kind != SinkErrorKind::Rejected {
                return Some(kind);
            }
        }
        current = e.source();
    }
    None
}

fn chain_contains<T: std::error::Error + 'static>(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<T>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Classify a transport-level `reqwest` failure
fn classify_transport_error(err: &reqwest::Error) -> SinkError {
    let message = err.to_string();
    let kind = if err.is_timeout() {
        SinkErrorKind::Timeout
    } else if let Some(kind) = io_kind_in_chain(err) {
        kind
    } else if chain_contains::<serde_json::Error>(err) {
        SinkErrorKind::Malformed
    } else if err.is_connect() {
        SinkErrorKind::Unreachable
    } else if err.is_body() || err.is_request() {
        // hyper reports a peer closing mid-body as an incomplete message
        SinkErrorKind::ConnectionReset
    } else {
        SinkErrorKind::Rejected
    };
    SinkError::new(kind, message)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ─────────────────────────────────────────────────────────────────
// Sink implementation
// ─────────────────────────────────────────────────────────────────

/// Result of a connectivity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub server_version: String,
    pub table_exists: bool,
}

/// ClickHouse sink
#[derive(Debug, Clone)]
pub struct ClickHouseSink {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClickHouseSinkConfig,
    settings: BTreeMap<String, String>,
}

impl ClickHouseSink {
    pub fn new(config: ClickHouseSinkConfig, batch_size: u64) -> Self {
        let settings = config.insert_settings(batch_size);
        Self {
            inner: Arc::new(Inner { config, settings }),
        }
    }

    pub fn config(&self) -> &ClickHouseSinkConfig {
        &self.inner.config
    }

    /// Build a client that never keeps idle sockets around
    fn create_client(config: &ClickHouseSinkConfig) -> SinkResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| SinkError::rejected(format!("Failed to build HTTP client: {}", e)))
    }

    /// Run `SELECT version()` and check that the target table exists
    pub async fn check(&self) -> SinkResult<CheckReport> {
        let client = Self::create_client(&self.inner.config)?;
        let server_version = self.inner.query(&client, "SELECT version()").await?;

        let config = &self.inner.config;
        let exists_sql = format!("EXISTS TABLE {}.{}", config.database, config.table);
        let table_exists = self.inner.query(&client, &exists_sql).await? == "1";

        Ok(CheckReport {
            server_version,
            table_exists,
        })
    }
}

impl Inner {
    fn base_url(&self) -> SinkResult<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| SinkError::rejected(format!("Invalid ClickHouse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("database", &self.config.database);
        Ok(url)
    }

    fn insert_url(&self, table: &str, format: RowFormat) -> SinkResult<Url> {
        ClickHouseSinkConfig::validate_table_name(table).map_err(SinkError::schema)?;

        let mut url = self.base_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", &format!("INSERT INTO {} FORMAT {}", table, format));
            for (key, value) in &self.settings {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let password = self
            .config
            .password
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| p.expose_secret());
        request.basic_auth(&self.config.username, password)
    }

    async fn query(&self, client: &reqwest::Client, sql: &str) -> SinkResult<String> {
        let mut url = self.base_url()?;
        url.query_pairs_mut().append_pair("query", sql);

        let response = self
            .authorize(client.get(url))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        let status = response.status();
        let header_code =
            header_str(response.headers(), EXCEPTION_CODE_HEADER).and_then(|c| c.parse().ok());
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() || header_code.is_some() {
            return Err(classify_response(status, header_code, &body));
        }
        Ok(body.trim().to_string())
    }
}

/// Encode a row stream as newline-delimited JSON chunks
fn encode_rows(
    rows: RowStream,
) -> impl futures::Stream<Item = std::result::Result<Bytes, serde_json::Error>> + Send + 'static {
    rows.ready_chunks(ROWS_PER_CHUNK).map(|chunk| -> std::result::Result<Bytes, serde_json::Error> {
        let mut buf = Vec::with_capacity(chunk.len() * 1024);
        for record in &chunk {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(Bytes::from(buf))
    })
}

#[async_trait]
impl Sink for ClickHouseSink {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn connect(&self) -> SinkResult<Box<dyn SinkConnection>> {
        let client = Self::create_client(&self.inner.config)?;
        Ok(Box::new(ClickHouseConnection {
            client,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn maintenance_hint(&self, table: &str) -> Option<String> {
        Some(format!(
            "clickhouse-client -q \"OPTIMIZE TABLE {} FINAL SETTINGS allow_disk_spill_for_merge = 1, max_memory_usage = '{}'\"",
            table, self.inner.config.optimize_max_memory
        ))
    }
}

/// One attempt's HTTP client
pub struct ClickHouseConnection {
    client: reqwest::Client,
    inner: Arc<Inner>,
}

#[async_trait]
impl SinkConnection for ClickHouseConnection {
    async fn insert(
        &mut self,
        table: &str,
        rows: RowStream,
        format: RowFormat,
    ) -> SinkResult<InsertSummary> {
        let url = self.inner.insert_url(table, format)?;
        let offset = rows.offset();
        let streamed = rows.streamed();

        debug!(table, offset, "Sending insert to ClickHouse");
        let response = self
            .inner
            .authorize(self.client.post(url))
            .body(reqwest::Body::wrap_stream(encode_rows(rows)))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let header_code =
            header_str(response.headers(), EXCEPTION_CODE_HEADER).and_then(|c| c.parse().ok());
        let query_id = header_str(response.headers(), QUERY_ID_HEADER).map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() || header_code.is_some() {
            return Err(classify_response(status, header_code, &body));
        }

        debug!(table, offset, rows = streamed.get(), ?query_id, "ClickHouse acknowledged insert");
        Ok(InsertSummary {
            rows: streamed.get(),
            query_id,
        })
    }

    async fn close(self: Box<Self>) {
        // Dropping the client tears down its (unpooled) sockets
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchSpan;
    use crate::config::GeneratorConfig;
    use crate::stream::RowSource;
    use crate::synth::RecordSynthesizer;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_default_config() {
        let config = ClickHouseSinkConfig::default();
        assert_eq!(config.url, "http://localhost:8123");
        assert_eq!(config.database, "countly_drill");
        assert_eq!(config.table, "drill_events");
        assert_eq!(config.username, "default");
        assert!(config.password.is_none());
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_validation() {
        let config = ClickHouseSinkConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(ClickHouseSinkConfig::validate_table_name("drill_events").is_ok());
        assert!(ClickHouseSinkConfig::validate_table_name("countly_drill.drill_events").is_ok());
        assert!(ClickHouseSinkConfig::validate_table_name("_t1").is_ok());
        assert!(ClickHouseSinkConfig::validate_table_name("1table").is_err());
        assert!(ClickHouseSinkConfig::validate_table_name("t; DROP TABLE x").is_err());
        assert!(ClickHouseSinkConfig::validate_table_name("").is_err());
        assert!(ClickHouseSinkConfig::validate_table_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_database_name_validation() {
        assert!(ClickHouseSinkConfig::validate_database_name("countly_drill").is_ok());
        assert!(ClickHouseSinkConfig::validate_database_name("db-name").is_err());
    }

    #[test]
    fn test_insert_settings_defaults_and_overrides() {
        let mut config = ClickHouseSinkConfig::default();
        let settings = config.insert_settings(25_000);
        assert_eq!(settings["async_insert"], "1");
        assert_eq!(settings["wait_for_async_insert"], "1");
        assert_eq!(settings["wait_end_of_query"], "1");
        assert_eq!(settings["optimize_on_insert"], "1");
        assert_eq!(settings["input_format_parallel_parsing"], "1");
        assert_eq!(settings["max_insert_block_size"], "25000");

        config
            .settings
            .insert("async_insert".to_string(), "0".to_string());
        config
            .settings
            .insert("max_partitions_per_insert_block".to_string(), "1000".to_string());
        let settings = config.insert_settings(10);
        assert_eq!(settings["async_insert"], "0");
        assert_eq!(settings["max_partitions_per_insert_block"], "1000");
        assert_eq!(settings["max_insert_block_size"], "10");
    }

    #[test]
    fn test_insert_url() {
        let sink = ClickHouseSink::new(ClickHouseSinkConfig::default(), 25_000);
        let url = sink
            .inner
            .insert_url("drill_events", RowFormat::JsonEachRow)
            .unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(8123));

        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["database"], "countly_drill");
        assert_eq!(pairs["query"], "INSERT INTO drill_events FORMAT JSONEachRow");
        assert_eq!(pairs["max_insert_block_size"], "25000");
        assert_eq!(pairs["wait_end_of_query"], "1");
    }

    #[test]
    fn test_insert_url_rejects_bad_table() {
        let sink = ClickHouseSink::new(ClickHouseSinkConfig::default(), 25_000);
        let err = sink
            .inner
            .insert_url("x; DROP TABLE y", RowFormat::JsonEachRow)
            .unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::Schema);
    }

    #[test]
    fn test_maintenance_hint() {
        let sink = ClickHouseSink::new(ClickHouseSinkConfig::default(), 25_000);
        assert_eq!(
            sink.maintenance_hint("drill_events").unwrap(),
            "clickhouse-client -q \"OPTIMIZE TABLE drill_events FINAL SETTINGS allow_disk_spill_for_merge = 1, max_memory_usage = '20G'\""
        );
    }

    #[test]
    fn test_parse_exception_code() {
        assert_eq!(
            parse_exception_code("Code: 241. DB::Exception: Memory limit (total) exceeded"),
            Some(241)
        );
        assert_eq!(parse_exception_code("Code:253. DB::Exception"), Some(253));
        assert_eq!(parse_exception_code("no code here"), None);
    }

    #[test]
    fn test_classify_response_codes() {
        let cases = [
            (241, SinkErrorKind::ResourceExhausted),
            (252, SinkErrorKind::ResourceExhausted),
            (253, SinkErrorKind::ResourceExhausted),
            (159, SinkErrorKind::Timeout),
            (209, SinkErrorKind::Timeout),
            (210, SinkErrorKind::ConnectionReset),
            (516, SinkErrorKind::Auth),
            (497, SinkErrorKind::Auth),
            (60, SinkErrorKind::Schema),
            (16, SinkErrorKind::Schema),
            (27, SinkErrorKind::Malformed),
            (117, SinkErrorKind::Malformed),
            (999, SinkErrorKind::Rejected),
        ];
        for (code, expected) in cases {
            let err = classify_response(StatusCode::INTERNAL_SERVER_ERROR, Some(code), "boom");
            assert_eq!(err.kind, expected, "code {}", code);
            assert_eq!(err.code, Some(code));
        }
    }

    #[test]
    fn test_classify_response_body_code() {
        let body = "Code: 241. DB::Exception: Memory limit (for query) exceeded: would use 9.31 GiB. (MEMORY_LIMIT_EXCEEDED)";
        let err = classify_response(StatusCode::INTERNAL_SERVER_ERROR, None, body);
        assert_eq!(err.kind, SinkErrorKind::ResourceExhausted);
        assert_eq!(err.code, Some(241));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_response_memory_text_without_code() {
        let err = classify_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "query failed: MEMORY_LIMIT_EXCEEDED",
        );
        assert_eq!(err.kind, SinkErrorKind::ResourceExhausted);
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_classify_response_status_fallback() {
        assert_eq!(
            classify_response(StatusCode::UNAUTHORIZED, None, "").kind,
            SinkErrorKind::Auth
        );
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, None, "denied").kind,
            SinkErrorKind::Auth
        );
        assert_eq!(
            classify_response(StatusCode::SERVICE_UNAVAILABLE, None, "").kind,
            SinkErrorKind::ResourceExhausted
        );
        let err = classify_response(StatusCode::BAD_REQUEST, None, "");
        assert_eq!(err.kind, SinkErrorKind::Rejected);
        assert_eq!(err.message, "HTTP 400 Bad Request");
    }

    #[test]
    fn test_classify_response_is_stable() {
        let body = "Code: 516. DB::Exception: default: Authentication failed";
        let first = classify_response(StatusCode::FORBIDDEN, None, body);
        for _ in 0..5 {
            assert_eq!(classify_response(StatusCode::FORBIDDEN, None, body), first);
        }
        assert!(!first.is_retryable());
    }

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transport: {}", self.0)
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_io_kind_in_chain() {
        use std::io::{Error, ErrorKind};

        let reset = Wrapped(Error::new(ErrorKind::ConnectionReset, "ECONNRESET"));
        assert_eq!(io_kind_in_chain(&reset), Some(SinkErrorKind::ConnectionReset));

        let pipe = Wrapped(Error::new(ErrorKind::BrokenPipe, "EPIPE"));
        assert_eq!(io_kind_in_chain(&pipe), Some(SinkErrorKind::ConnectionReset));

        let refused = Wrapped(Error::new(ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(io_kind_in_chain(&refused), Some(SinkErrorKind::Unreachable));

        let other = Wrapped(Error::new(ErrorKind::Other, "other"));
        assert_eq!(io_kind_in_chain(&other), None);
    }

    #[test]
    fn test_truncate_message() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 100);
        let truncated = truncate_message(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.len(), MAX_MESSAGE_LEN + 3);
        assert_eq!(truncate_message("  short \n"), "short");
    }

    #[tokio::test]
    async fn test_encode_rows_json_lines() {
        let config = GeneratorConfig {
            total_rows: 1_000,
            ..Default::default()
        };
        let synth = Arc::new(RecordSynthesizer::new(&config, 1, 1_700_000_000_000).unwrap());
        let source = RowSource::new(
            synth,
            BatchSpan {
                index: 0,
                offset: 0,
                rows: 600,
            },
        );

        let chunks: Vec<Bytes> = encode_rows(source.open())
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);

        let body: Vec<u8> = chunks.concat();
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 600);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["a"], "APP_ID");
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Insert over HTTP against a scripted local server
    // ─────────────────────────────────────────────────────────────

    fn row_stream(rows: u64) -> RowStream {
        let config = GeneratorConfig {
            total_rows: rows,
            ..Default::default()
        };
        let synth = Arc::new(RecordSynthesizer::new(&config, 3, 1_700_000_000_000).unwrap());
        RowSource::new(
            synth,
            BatchSpan {
                index: 0,
                offset: 0,
                rows,
            },
        )
        .open()
    }

    fn sink_for(addr: SocketAddr) -> ClickHouseSink {
        let config = ClickHouseSinkConfig {
            url: format!("http://{}", addr),
            request_timeout_secs: 30,
            ..Default::default()
        };
        ClickHouseSink::new(config, 25_000)
    }

    async fn insert_via(sink: &ClickHouseSink, rows: RowStream) -> SinkResult<InsertSummary> {
        let mut conn = sink.connect().await?;
        let result = conn
            .insert("drill_events", rows, RowFormat::JsonEachRow)
            .await;
        conn.close().await;
        result
    }

    /// Read until the end of the request head; returns everything read so far
    async fn read_head(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
        }
        buf
    }

    /// Read the rest of a chunked request body
    async fn read_chunked_body(stream: &mut TcpStream, mut buf: Vec<u8>) -> Vec<u8> {
        let mut chunk = [0u8; 65536];
        while !buf.ends_with(b"\r\n0\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        buf
    }

    #[tokio::test]
    async fn test_insert_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_head(&mut stream).await;
            let request = read_chunked_body(&mut stream, head).await;
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nX-ClickHouse-Query-Id: q-42\r\nContent-Length: 0\r\n\r\n",
                )
                .await
                .unwrap();
            request
        });

        let summary = insert_via(&sink_for(addr), row_stream(50)).await.unwrap();
        assert_eq!(summary.rows, 50);
        assert_eq!(summary.query_id.as_deref(), Some("q-42"));

        let request = String::from_utf8_lossy(&server.await.unwrap()).into_owned();
        assert!(request.starts_with("POST /?database=countly_drill&query=INSERT+INTO+drill_events+FORMAT+JSONEachRow"));
        assert!(request.contains("async_insert=1"));
        assert!(request.contains("max_insert_block_size=25000"));
        assert_eq!(request.matches("\"_id\":").count(), 50);
    }

    #[tokio::test]
    async fn test_insert_exception_header_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_head(&mut stream).await;
            read_chunked_body(&mut stream, head).await;
            let body = "Code: 241. DB::Exception: Memory limit (total) exceeded";
            let response = format!(
                "HTTP/1.1 500 Internal Server Error\r\nX-ClickHouse-Exception-Code: 241\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let err = insert_via(&sink_for(addr), row_stream(50)).await.unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::ResourceExhausted);
        assert_eq!(err.code, Some(241));
        assert!(err.message.contains("Memory limit"));
    }

    #[tokio::test]
    async fn test_early_auth_rejection_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_head(&mut stream).await;
            let body = "Code: 516. DB::Exception: default: Authentication failed";
            let response = format!(
                "HTTP/1.1 401 Unauthorized\r\nX-ClickHouse-Exception-Code: 516\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            // Keep draining so the client sees the response, not a reset
            let mut chunk = [0u8; 65536];
            while let Ok(n) = stream.read(&mut chunk).await {
                if n == 0 {
                    break;
                }
            }
        });

        let err = insert_via(&sink_for(addr), row_stream(25_000)).await.unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::Auth);
        assert_eq!(err.code, Some(516));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_reset_mid_body_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = read_head(&mut stream).await;
            let mut chunk = [0u8; 8192];
            while buf.len() < 64 * 1024 {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            // Zero linger turns the close into an RST
            #[allow(deprecated)]
            stream.set_linger(Some(Duration::ZERO)).unwrap();
            drop(stream);
        });

        let err = insert_via(&sink_for(addr), row_stream(20_000)).await.unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::ConnectionReset, "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = insert_via(&sink_for(addr), row_stream(10)).await.unwrap_err();
        assert_eq!(err.kind, SinkErrorKind::Unreachable, "got {:?}", err);
        assert!(!err.is_retryable());
    }
}
