//! drillfill - synthetic drill-event bulk loader
//!
//! # Usage
//!
//! ```bash
//! # Load with the configured (or default) settings
//! drillfill -c drillfill.yaml
//!
//! # Smaller run, reproducible data
//! drillfill -c drillfill.yaml run --rows 100000 --seed 42
//!
//! # Print rows instead of inserting them
//! drillfill run --dry-run --rows 10
//!
//! # Validate configuration and show the batch plan
//! drillfill -c drillfill.yaml validate
//! drillfill -c drillfill.yaml plan
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drillfill::batch::{BatchPlan, Progress};
use drillfill::config::{LoaderConfig, SinkConfig};
use drillfill::sink::{self, ClickHouseSink, StdoutSinkConfig};
use drillfill::synth::{RandomSource, RecordSynthesizer};
use drillfill::throttle::ThrottleController;
use drillfill::Loader;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "drillfill")]
#[command(version, about = "Synthetic drill-event bulk loader for ClickHouse")]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "DRILLFILL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and insert all batches (default)
    Run {
        /// Override generator.total_rows
        #[arg(long)]
        rows: Option<u64>,
        /// Override batch.size
        #[arg(long)]
        batch_size: Option<u64>,
        /// Override generator.seed
        #[arg(long)]
        seed: Option<u64>,
        /// Write rows to stdout instead of the configured sink
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate configuration file
    Validate,
    /// List the batches a run would insert
    Plan,
    /// Print generated records as JSON lines
    Sample {
        /// Number of records
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u64,
    },
    /// Check connectivity to ClickHouse and the target table
    Check,
    /// Print the JSON schema of the configuration file
    Schema {
        /// Output format (json, yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't need config
    if let Some(Commands::Schema { format }) = &cli.command {
        return show_schema(format);
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Commands::Run {
        rows: None,
        batch_size: None,
        seed: None,
        dry_run: false,
    }) {
        Commands::Run {
            rows,
            batch_size,
            seed,
            dry_run,
        } => run(config, rows, batch_size, seed, dry_run).await,
        Commands::Validate => validate_config(config),
        Commands::Plan => show_plan(config),
        Commands::Sample { count } => sample(config, count),
        Commands::Check => check_connectivity(config).await,
        Commands::Schema { .. } => unreachable!(), // handled above
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr; stdout carries rows and the completion hint
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<LoaderConfig> {
    match path {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let config = LoaderConfig::default();
            config
                .validate_all()
                .context("Default configuration is invalid")?;
            Ok(config)
        }
    }
}

async fn run(
    mut config: LoaderConfig,
    rows: Option<u64>,
    batch_size: Option<u64>,
    seed: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    if let Some(rows) = rows {
        config.generator.total_rows = rows;
    }
    if let Some(size) = batch_size {
        config.batch.size = size;
    }
    if seed.is_some() {
        config.generator.seed = seed;
    }
    if dry_run {
        config.sink = SinkConfig::Stdout(StdoutSinkConfig {
            table: config.sink.table().to_string(),
            ..Default::default()
        });
    }
    config
        .validate_all()
        .context("Invalid configuration after applying overrides")?;

    let sink = sink::from_config(&config.sink, config.batch.size);
    let mut loader = Loader::new(config, sink).context("Failed to prepare load")?;
    info!(seed = loader.seed(), "Replay this run with --seed {}", loader.seed());

    let mut last: Option<Progress> = None;
    let result = tokio::select! {
        result = loader.run_with_progress(|p| last = Some(*p)) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let report = match result {
        Some(result) => result.context("Load failed")?,
        None => {
            let inserted = last.map(|p| p.rows_inserted).unwrap_or(0);
            warn!(rows_inserted = inserted, "Interrupted");
            anyhow::bail!("Interrupted after {} rows", inserted);
        }
    };

    println!();
    println!("🎉 Ingestion complete.");
    println!(
        "  {} rows in {} batches ({} retries, {} throttle pauses) in {:.1}s, seed {}",
        report.rows_inserted,
        report.batches,
        report.retries,
        report.throttle_pauses,
        report.elapsed.as_secs_f64(),
        report.seed
    );
    if let Some(hint) = report.maintenance_hint {
        println!();
        println!("To merge the parts later, run:");
        println!("{}", hint);
    }
    Ok(())
}

fn validate_config(config: LoaderConfig) -> Result<()> {
    let plan = BatchPlan::new(
        config.generator.total_rows,
        config.batch.size,
        config.batch.remainder,
    )?;

    println!("✓ Configuration valid!\n");

    println!("Generator:");
    println!("  Total rows: {}", config.generator.total_rows);
    println!("  Lookback: {} days", config.generator.lookback_days);
    println!("  Disorder fraction: {}", config.generator.disorder_fraction);
    println!("  UID pool fraction: {}", config.generator.uid_pool_fraction);
    println!("  App id: {}", config.generator.app_id);
    match config.generator.seed {
        Some(seed) => println!("  Seed: {}", seed),
        None => println!("  Seed: random"),
    }
    println!();

    println!("Batches:");
    println!("  Size: {}", plan.batch_size());
    println!("  Count: {}", plan.batch_count());
    println!("  Last batch: {} rows", plan.last_batch_rows());
    println!();

    println!("Throttle:");
    if config.throttle.every_rows == 0 {
        println!("  disabled");
    } else {
        println!(
            "  {}ms every {} rows",
            config.throttle.pause_ms, config.throttle.every_rows
        );
    }
    println!();

    println!("Retry:");
    println!("  Delay: {}ms", config.retry.delay_ms);
    match config.retry.max_attempts {
        Some(max) => println!("  Max attempts: {}", max),
        None => println!("  Max attempts: unbounded"),
    }
    println!();

    println!("Sink: {}", config.sink.kind());
    match &config.sink {
        SinkConfig::Clickhouse(c) => {
            println!("  URL: {}", c.url);
            println!("  Database: {}", c.database);
            println!("  Table: {}", c.table);
            println!("  Username: {}", c.username);
            println!(
                "  Password: {}",
                if c.password.as_ref().is_some_and(|p| !p.is_empty()) {
                    "set"
                } else {
                    "none"
                }
            );
            for (key, value) in c.insert_settings(config.batch.size) {
                println!("  {} = {}", key, value);
            }
        }
        SinkConfig::Stdout(c) => {
            println!("  Table: {}", c.table);
        }
    }

    Ok(())
}

fn show_plan(config: LoaderConfig) -> Result<()> {
    let plan = BatchPlan::new(
        config.generator.total_rows,
        config.batch.size,
        config.batch.remainder,
    )?;
    let throttle = ThrottleController::from(&config.throttle);

    let mut inserted = 0u64;
    for span in plan.spans() {
        inserted += span.rows;
        let pause = throttle
            .pause_after(inserted, plan.total_rows())
            .map(|d| format!("  (pause {}ms)", d.as_millis()))
            .unwrap_or_default();
        println!(
            "#{:<6} offset={:<10} rows={:<8} cumulative={}{}",
            span.index, span.offset, span.rows, inserted, pause
        );
    }
    println!(
        "\n{} batches, {} rows",
        plan.batch_count(),
        plan.total_rows()
    );
    Ok(())
}

fn sample(config: LoaderConfig, count: u64) -> Result<()> {
    let seed = config
        .generator
        .seed
        .unwrap_or_else(RandomSource::entropy_seed);
    info!(seed, "Sampling {} records", count);

    let synth = RecordSynthesizer::new(
        &config.generator,
        seed,
        chrono::Utc::now().timestamp_millis(),
    )?;
    for record in synth.sample(count) {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

async fn check_connectivity(config: LoaderConfig) -> Result<()> {
    match &config.sink {
        SinkConfig::Clickhouse(c) => {
            println!("Checking ClickHouse at {} ...", c.url);
            let sink = ClickHouseSink::new(c.clone(), config.batch.size);
            let report = sink
                .check()
                .await
                .with_context(|| format!("ClickHouse check failed for {}", c.url))?;

            println!("  ✓ Connected (server version {})", report.server_version);
            if report.table_exists {
                println!("  ✓ Table {}.{} exists", c.database, c.table);
                Ok(())
            } else {
                println!("  ✗ Table {}.{} not found", c.database, c.table);
                anyhow::bail!("Target table {}.{} does not exist", c.database, c.table)
            }
        }
        SinkConfig::Stdout(_) => {
            println!("  ✓ stdout sink is always available");
            Ok(())
        }
    }
}

fn show_schema(format: &str) -> Result<()> {
    let schema = schemars::schema_for!(LoaderConfig);
    match format {
        "yaml" => println!("{}", serde_yaml::to_string(&schema)?),
        _ => println!("{}", serde_json::to_string_pretty(&schema)?),
    }
    Ok(())
}
