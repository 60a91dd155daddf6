//! End-to-end load scenarios against the mock sink

use drillfill::config::{LoaderConfig, SinkConfig};
use drillfill::sink::testing::MockSink;
use drillfill::sink::StdoutSinkConfig;
use drillfill::{Loader, LoaderError, LoaderState, SinkError, SinkErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const NOW: i64 = 1_700_000_000_000;

fn config(total_rows: u64, batch_size: u64) -> LoaderConfig {
    let mut config = LoaderConfig::default();
    config.generator.total_rows = total_rows;
    config.generator.seed = Some(7);
    config.batch.size = batch_size;
    config.throttle.every_rows = 0;
    config.sink = SinkConfig::Stdout(StdoutSinkConfig::default());
    config
}

fn loader(config: LoaderConfig, sink: &MockSink) -> Loader {
    Loader::new_at(config, Arc::new(sink.clone()), NOW).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_four_batches_report_progress_in_order() {
    let sink = MockSink::new();
    let mut seen = Vec::new();
    let report = loader(config(100, 25), &sink)
        .run_with_progress(|p| seen.push(p.rows_inserted))
        .await
        .unwrap();

    assert_eq!(seen, vec![25, 50, 75, 100]);
    assert_eq!(sink.committed_offsets(), vec![0, 25, 50, 75]);
    assert_eq!(report.rows_inserted, 100);
    assert_eq!(report.batches, 4);
    assert_eq!(report.state, LoaderState::Complete);

    let uids: Vec<u64> = sink.committed_rows().iter().map(|r| r.uid).collect();
    assert_eq!(uids.len(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_batch_retries_same_offset() {
    // Second insert attempt is batch #1 (offset 25); it dies after 10 rows
    let sink = MockSink::new().fail_insert(2, 10, SinkError::connection_reset("socket hang up"));
    let mut seen = Vec::new();
    let started = Instant::now();
    let report = loader(config(100, 25), &sink)
        .run_with_progress(|p| seen.push(p.rows_inserted))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(sink.attempt_offsets(), vec![0, 25, 25, 50, 75]);
    assert_eq!(sink.committed_offsets(), vec![0, 25, 50, 75]);
    assert_eq!(seen, vec![25, 50, 75, 100]);
    assert_eq!(report.rows_inserted, 100);
    assert_eq!(report.attempts, 5);
    assert_eq!(report.retries, 1);

    // The partial attempt leaves exact duplicates of the first 10 rows
    let inserts = sink.inserts();
    let failed = inserts.iter().find(|i| !i.succeeded).unwrap();
    let retried = inserts
        .iter()
        .find(|i| i.succeeded && i.offset == 25)
        .unwrap();
    assert_eq!(failed.rows.len(), 10);
    assert_eq!(failed.rows.as_slice(), &retried.rows[..10]);
    assert_eq!(sink.delivered_rows().len(), 110);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_aborts_run() {
    let sink = MockSink::new().fail_insert(
        3,
        0,
        SinkError::auth("Authentication failed: password is incorrect").with_code(516),
    );
    let mut loader = loader(config(100, 25), &sink);
    let err = loader.run().await.unwrap_err();

    match err {
        LoaderError::Insert { offset, source } => {
            assert_eq!(offset, 50);
            assert_eq!(source.kind, SinkErrorKind::Auth);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(loader.state(), LoaderState::Aborted);
    assert_eq!(sink.attempt_offsets(), vec![0, 25, 50]);
    assert_eq!(sink.committed_offsets(), vec![0, 25]);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_only_on_exact_multiples() {
    let mut config = config(100, 25);
    config.throttle.every_rows = 50;
    config.throttle.pause_ms = 5_000;

    let sink = MockSink::new();
    let started = Instant::now();
    let report = loader(config, &sink).run().await.unwrap();

    // 50 pauses; 25 and 75 are not multiples; 100 is the end of the run
    assert_eq!(report.throttle_pauses, 1);
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_never_triggers_off_multiple() {
    let mut config = config(100, 30);
    config.throttle.every_rows = 50;

    let sink = MockSink::new();
    let report = loader(config, &sink).run().await.unwrap();

    assert_eq!(sink.committed_offsets(), vec![0, 30, 60, 90]);
    assert_eq!(report.throttle_pauses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_closes_its_connection() {
    let sink = MockSink::new()
        .fail_insert(1, 3, SinkError::timeout("Timeout exceeded"))
        .fail_insert(2, 0, SinkError::resource_exhausted("Memory limit exceeded"))
        .fail_insert(5, 20, SinkError::connection_reset("EPIPE"));
    let report = loader(config(100, 25), &sink).run().await.unwrap();

    assert_eq!(report.attempts, 7);
    assert_eq!(sink.connections_opened(), 7);
    assert_eq!(sink.connections_closed(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_loads_identical_rows() {
    let first = MockSink::new();
    let second = MockSink::new().fail_insert(1, 7, SinkError::timeout("slow"));
    loader(config(60, 20), &first).run().await.unwrap();
    loader(config(60, 20), &second).run().await.unwrap();

    assert_eq!(first.committed_rows(), second.committed_rows());
}

#[tokio::test(start_paused = true)]
async fn test_short_final_batch() {
    let sink = MockSink::new();
    let report = loader(config(110, 25), &sink).run().await.unwrap();

    let sizes: Vec<usize> = sink.inserts().iter().map(|i| i.rows.len()).collect();
    assert_eq!(sizes, vec![25, 25, 25, 25, 10]);
    assert_eq!(report.rows_inserted, 110);
}
