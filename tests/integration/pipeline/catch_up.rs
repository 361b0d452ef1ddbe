use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{assert_is_contiguous, init_tracing, BlockIndexer, RecordingStorage},
    mock_chain::{MockBlock, MockChain},
};
use anyhow::{Context, Result};
use chainsync::{BatchAggregateProcessor, RetriableWriter, Runner, SyncConfig};
use tokio::time::timeout;

fn batch_processor(
    storage: &RecordingStorage,
    config: &SyncConfig,
) -> BatchAggregateProcessor<MockBlock, RecordingStorage> {
    let writer = RetriableWriter::new(Arc::new(storage.clone()), config);
    BatchAggregateProcessor::new(vec![Box::new(BlockIndexer)], writer, config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn catch_up_commits_batches_across_frontier_moves() -> Result<()> {
    init_tracing();
    let chain = MockChain::linear(0, 10).with_finalized(&[3, 5]);
    let storage = RecordingStorage::new();
    let config = SyncConfig::builder()
        .batch_size(3)
        .catch_up_routines(2)
        .build()?;

    let runner = Runner::new(config.clone());
    let cursor = timeout(
        Duration::from_secs(5),
        runner.catch_up(
            Arc::new(chain.clone()),
            batch_processor(&storage, &config),
            2,
        ),
    )
    .await
    .context("catch-up should finish once past the frontier")??;

    assert_eq!(cursor, 6);
    assert_eq!(storage.batches(), vec![vec![2, 3, 4], vec![5]]);
    assert!(!runner.cancellation_token().is_cancelled());

    let telemetry = runner.telemetry().snapshot();
    assert_eq!(telemetry.delivered_blocks, 4);
    assert_eq!(telemetry.committed_blocks, 4);
    assert_eq!(telemetry.committed_operations, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn catch_up_survives_fetch_and_commit_failures() -> Result<()> {
    init_tracing();
    let chain = MockChain::linear(0, 200).with_finalized(&[120, 180]);
    chain.fail_fetch(37, 2);
    chain.fail_fetch(150, 1);
    let storage = RecordingStorage::new();
    storage.fail_next(2);
    let config = SyncConfig::builder()
        .batch_size(25)
        .catch_up_routines(8)
        .catch_up_window(16)
        .catch_up_max_range(40)
        .channel_capacity(8)
        .retry_interval(Duration::from_millis(10))
        .build()?;

    let runner = Runner::new(config.clone());
    let cursor = timeout(
        Duration::from_secs(10),
        runner.catch_up(
            Arc::new(chain.clone()),
            batch_processor(&storage, &config),
            10,
        ),
    )
    .await
    .context("catch-up should finish")??;

    assert_eq!(cursor, 181);
    let committed: Vec<u64> = storage.batches().into_iter().flatten().collect();
    assert_eq!(committed.first(), Some(&10));
    assert_eq!(committed.last(), Some(&180));
    assert_is_contiguous(&committed);
    assert!(chain.fetches() >= 171);

    let telemetry = runner.telemetry().snapshot();
    assert_eq!(telemetry.fetch_errors, 3);
    assert_eq!(telemetry.commit_errors, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catch_up_with_nothing_to_do_returns_the_cursor() -> Result<()> {
    let chain = MockChain::linear(0, 3).with_finalized(&[3]);
    let storage = RecordingStorage::new();
    let config = SyncConfig::default();

    let cursor = Runner::new(config.clone())
        .catch_up(Arc::new(chain), batch_processor(&storage, &config), 4)
        .await?;

    assert_eq!(cursor, 4);
    assert!(storage.batches().is_empty());
    Ok(())
}
