//! Configuration types for drillfill
//!
//! Everything the pipeline needs is injected through [`LoaderConfig`]: the
//! dataset size and shape, batching, throttling, retry behavior and the
//! target sink. Defaults reproduce a 2M-row backfill into
//! `countly_drill.drill_events` on a local ClickHouse.

use crate::batch::RemainderPolicy;
use crate::error::{LoaderError, Result};
use crate::sink::clickhouse::ClickHouseSinkConfig;
use crate::sink::stdout::StdoutSinkConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use validator::Validate;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
pub struct LoaderConfig {
    /// Record synthesis settings
    #[serde(default)]
    #[validate(nested)]
    pub generator: GeneratorConfig,

    /// Batch partitioning
    #[serde(default)]
    #[validate(nested)]
    pub batch: BatchConfig,

    /// Periodic pause between batches
    #[serde(default)]
    #[validate(nested)]
    pub throttle: ThrottleConfig,

    /// Retry behavior for transient sink failures
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Target sink
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Record synthesis settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct GeneratorConfig {
    /// Total number of records to generate and insert (at most one billion;
    /// the disorder set is held in memory for the whole run)
    #[serde(default = "default_total_rows")]
    #[validate(range(max = 1_000_000_000))]
    pub total_rows: u64,

    /// Width of the timestamp window ending at run start, in days
    #[serde(default = "default_lookback_days")]
    #[validate(range(min = 1, max = 3650))]
    pub lookback_days: u32,

    /// Fraction of records whose timestamp is perturbed out of order
    #[serde(default = "default_disorder_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub disorder_fraction: f64,

    /// Size of the uid pool as a fraction of `total_rows`
    #[serde(default = "default_uid_pool_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub uid_pool_fraction: f64,

    /// Application id written to every record
    #[serde(default = "default_app_id")]
    #[validate(length(min = 1, max = 255))]
    pub app_id: String,

    /// Seed for the random source (random when unset; the chosen seed is logged)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_total_rows() -> u64 {
    2_000_000
}

fn default_lookback_days() -> u32 {
    30
}

fn default_disorder_fraction() -> f64 {
    0.01
}

fn default_uid_pool_fraction() -> f64 {
    0.07
}

fn default_app_id() -> String {
    "APP_ID".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            total_rows: default_total_rows(),
            lookback_days: default_lookback_days(),
            disorder_fraction: default_disorder_fraction(),
            uid_pool_fraction: default_uid_pool_fraction(),
            app_id: default_app_id(),
            seed: None,
        }
    }
}

/// Batch partitioning
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct BatchConfig {
    /// Rows per insert
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 10_000_000))]
    pub size: u64,

    /// What to do when `total_rows` is not a multiple of `size`
    #[serde(default)]
    pub remainder: RemainderPolicy,
}

fn default_batch_size() -> u64 {
    25_000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            remainder: RemainderPolicy::default(),
        }
    }
}

/// Periodic pause between batches
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ThrottleConfig {
    /// Pause whenever the inserted row count is a multiple of this (0 = never)
    #[serde(default = "default_throttle_every_rows")]
    pub every_rows: u64,

    /// Pause length in milliseconds
    #[serde(default = "default_throttle_pause_ms")]
    #[validate(range(max = 3_600_000))]
    pub pause_ms: u64,
}

fn default_throttle_every_rows() -> u64 {
    20_000
}

fn default_throttle_pause_ms() -> u64 {
    5_000
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            every_rows: default_throttle_every_rows(),
            pause_ms: default_throttle_pause_ms(),
        }
    }
}

/// Retry behavior for transient sink failures
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct RetryConfig {
    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    #[validate(range(max = 3_600_000))]
    pub delay_ms: u64,

    /// Maximum attempts per batch (unset = retry until success)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_attempts: Option<u32>,
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay_ms(),
            max_attempts: None,
        }
    }
}

/// Target sink selection
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// ClickHouse over HTTP (`JSONEachRow`)
    Clickhouse(ClickHouseSinkConfig),
    /// JSON lines on stdout (dry run)
    Stdout(StdoutSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Clickhouse(ClickHouseSinkConfig::default())
    }
}

impl SinkConfig {
    /// Short connector name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Clickhouse(_) => "clickhouse",
            Self::Stdout(_) => "stdout",
        }
    }

    /// Target table rows are inserted into
    pub fn table(&self) -> &str {
        match self {
            Self::Clickhouse(c) => &c.table,
            Self::Stdout(c) => &c.table,
        }
    }

    fn validate_sink(&self) -> Result<()> {
        match self {
            Self::Clickhouse(c) => {
                c.validate()
                    .map_err(|e| LoaderError::config(format!("sink: {}", e)))?;
                ClickHouseSinkConfig::validate_database_name(&c.database)
                    .map_err(LoaderError::Config)?;
                ClickHouseSinkConfig::validate_table_name(&c.table)
                    .map_err(LoaderError::Config)?;
                Ok(())
            }
            Self::Stdout(c) => c
                .validate()
                .map_err(|e| LoaderError::config(format!("sink: {}", e))),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Field-level validation plus cross-field checks
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| LoaderError::config(e.to_string()))?;
        self.sink.validate_sink()?;

        // Rejects non-divisible plans when the remainder policy says so
        crate::batch::BatchPlan::new(
            self.generator.total_rows,
            self.batch.size,
            self.batch.remainder,
        )?;
        Ok(())
    }
}
