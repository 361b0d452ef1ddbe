use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, BlockIndexer, Change, RecordingStorage},
    mock_chain::{MockBlock, MockChain},
};
use anyhow::{Context, Result};
use chainsync::{
    BatchAggregateProcessor, ContractViolation, PollerState, ReorgSnapshot, RetriableWriter,
    RevertProcessor, RevertableAggregateProcessor, Runner, SyncConfig,
};
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contract_violation_during_catch_up_stops_the_runner() -> Result<()> {
    init_tracing();
    let chain = MockChain::linear(0, 50).with_finalized(&[50]);
    chain.violate_at(20);
    let storage = RecordingStorage::new();
    let config = SyncConfig::builder()
        .catch_up_routines(4)
        .batch_size(5)
        .build()?;
    let writer = RetriableWriter::new(Arc::new(storage.clone()), &config);
    let processor: BatchAggregateProcessor<MockBlock, RecordingStorage> =
        BatchAggregateProcessor::new(vec![Box::new(BlockIndexer)], writer, &config);

    let runner = Runner::new(config);
    let err = timeout(
        Duration::from_secs(5),
        runner.catch_up(Arc::new(chain), processor, 0),
    )
    .await
    .context("runner should stop after a contract violation")?
    .expect_err("contract violation must be fatal");

    assert!(ContractViolation::is_violation(&err), "unexpected error: {err:#}");
    assert!(format!("{err:#}").contains("block 20"));
    assert!(runner.cancellation_token().is_cancelled());

    let committed: Vec<u64> = storage.batches().into_iter().flatten().collect();
    assert!(committed.iter().all(|&number| number < 20));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn out_of_sequence_resume_point_is_fatal_for_latest_follower() -> Result<()> {
    init_tracing();
    let chain = MockChain::linear(0, 30).with_finalized(&[5]).with_latest(&[30]);
    let storage = RecordingStorage::new();
    let config = SyncConfig::default();
    let writer = RetriableWriter::new(Arc::new(storage.clone()), &config);
    let processors: Vec<Box<dyn RevertProcessor<MockBlock, Vec<Change>>>> =
        vec![Box::new(BlockIndexer)];
    let processor = RevertableAggregateProcessor::new(processors, writer);
    let state = PollerState::new(25).with_reorg(ReorgSnapshot::new(10, "10a"));

    let runner = Runner::new(config);
    let err = timeout(
        Duration::from_secs(5),
        runner.follow_latest(Arc::new(chain), processor, state),
    )
    .await
    .context("runner should stop")?
    .expect_err("gap between window and cursor must be fatal");

    assert!(ContractViolation::is_violation(&err));
    assert!(storage.batches().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_until_ctrl_c_returns_when_work_completes() -> Result<()> {
    let chain = MockChain::linear(0, 5).with_finalized(&[5]);
    let storage = RecordingStorage::new();
    let config = SyncConfig::builder().batch_size(2).build()?;
    let writer = RetriableWriter::new(Arc::new(storage.clone()), &config);
    let processor: BatchAggregateProcessor<MockBlock, RecordingStorage> =
        BatchAggregateProcessor::new(vec![Box::new(BlockIndexer)], writer, &config);

    let runner = Runner::new(config);
    let cursor = timeout(
        Duration::from_secs(5),
        runner.run_until_ctrl_c(runner.catch_up(Arc::new(chain), processor, 0)),
    )
    .await
    .context("work should complete without a signal")??;

    assert_eq!(cursor, 6);
    assert_eq!(storage.batches(), vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_catch_up_does_not_report_uncommitted_blocks() -> Result<()> {
    init_tracing();
    let chain = MockChain::linear(0, 100_000).with_finalized(&[100_000]);
    let storage = RecordingStorage::new();
    let config = SyncConfig::builder()
        .catch_up_routines(4)
        .batch_size(1_000_000)
        .build()?;
    let writer = RetriableWriter::new(Arc::new(storage.clone()), &config);
    let processor: BatchAggregateProcessor<MockBlock, RecordingStorage> =
        BatchAggregateProcessor::new(vec![Box::new(BlockIndexer)], writer, &config);

    let runner = Runner::new(config);
    let shutdown = runner.cancellation_token();
    let (outcome, ()) = tokio::join!(
        timeout(
            Duration::from_secs(5),
            runner.catch_up(Arc::new(chain), processor, 0),
        ),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        },
    );

    let err = outcome
        .context("cancelled catch-up should stop promptly")?
        .expect_err("a cancelled catch-up has no committed cursor to report");
    assert!(format!("{err:#}").contains("cancelled"), "unexpected error: {err:#}");
    assert!(!ContractViolation::is_violation(&err));
    assert!(storage.batches().is_empty());
    assert_eq!(runner.telemetry().snapshot().committed_blocks, 0);
    Ok(())
}
