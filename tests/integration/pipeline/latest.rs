use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, wait_until, BlockIndexer, Change, RecordingStorage},
    mock_chain::{MockBlock, MockChain},
};
use anyhow::Result;
use chainsync::{
    PollerState, RetriableWriter, RevertProcessor, RevertableAggregateProcessor, Runner,
    SyncConfig,
};
use tokio::time::timeout;

fn revertable_processor(
    storage: &RecordingStorage,
    config: &SyncConfig,
) -> RevertableAggregateProcessor<MockBlock, RecordingStorage> {
    let writer = RetriableWriter::new(Arc::new(storage.clone()), config);
    let processors: Vec<Box<dyn RevertProcessor<MockBlock, Vec<Change>>>> =
        vec![Box::new(BlockIndexer)];
    RevertableAggregateProcessor::new(processors, writer)
}

fn config() -> SyncConfig {
    SyncConfig::builder()
        .idle_interval(Duration::from_millis(10))
        .retry_interval(Duration::from_millis(10))
        .build()
        .expect("valid config")
}

/// Blocks 2..=6 are stable. Block 7 is replaced twice and block 8 once, so the follower walks
/// back through two nested reorgs before settling on fork `c`.
fn nested_reorg_chain() -> MockChain {
    let chain = MockChain::new().with_finalized(&[1]).with_latest(&[9]);
    for number in 2..=6 {
        chain.serve(MockBlock::new(number, "a", "a"));
    }
    chain.serve(MockBlock::new(7, "a", "a"));
    chain.serve(MockBlock::new(7, "b", "a"));
    chain.serve(MockBlock::new(7, "c", "a"));
    chain.serve(MockBlock::new(8, "b", "b"));
    chain.serve(MockBlock::new(8, "b", "b"));
    chain.serve(MockBlock::new(8, "c", "c"));
    chain.serve(MockBlock::new(9, "c", "c"));
    chain
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nested_reorgs_are_reverted_before_replacement() -> Result<()> {
    init_tracing();
    let storage = RecordingStorage::new();
    let config = config();
    let runner = Arc::new(Runner::new(config.clone()));
    let processor = revertable_processor(&storage, &config);

    let handle = tokio::spawn({
        let runner = Arc::clone(&runner);
        let chain = Arc::new(nested_reorg_chain());
        async move {
            runner
                .follow_latest(chain, processor, PollerState::new(2))
                .await
        }
    });

    wait_until("block 9c", Duration::from_secs(5), || {
        storage.hash_of(9).as_deref() == Some("9c")
    })
    .await?;
    runner.cancellation_token().cancel();
    timeout(Duration::from_secs(2), handle).await???;

    let committed: Vec<u64> = storage.blocks().into_keys().collect();
    assert_eq!(committed, (2..=9).collect::<Vec<_>>());
    assert_eq!(storage.reverts(), vec![vec![7], vec![7, 8]]);
    assert_eq!(storage.hash_of(7).as_deref(), Some("7c"));
    assert_eq!(storage.hash_of(8).as_deref(), Some("8c"));

    let telemetry = runner.telemetry().snapshot();
    assert_eq!(telemetry.reorgs, 3);
    assert_eq!(telemetry.reverted_blocks, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn follower_resumes_from_persisted_window() -> Result<()> {
    init_tracing();
    let chain = MockChain::new().with_finalized(&[10]).with_latest(&[12]);
    chain.serve(MockBlock::new(12, "b", "b"));
    chain.serve(MockBlock::new(11, "b", "a"));
    chain.serve(MockBlock::new(12, "b", "b"));

    let storage = RecordingStorage::new();
    let config = config();
    let runner = Arc::new(Runner::new(config.clone()));
    let processor = revertable_processor(&storage, &config);
    let state: PollerState = serde_json::from_str(
        r#"{
            "next_block_number": 12,
            "reorg": {"finalized_number": 10, "finalized_hash": "10a", "blocks": {"11": "11a"}}
        }"#,
    )?;

    let handle = tokio::spawn({
        let runner = Arc::clone(&runner);
        let chain = Arc::new(chain.clone());
        async move { runner.follow_latest(chain, processor, state).await }
    });

    wait_until("block 12b", Duration::from_secs(5), || {
        storage.hash_of(12).is_some()
    })
    .await?;
    runner.cancellation_token().cancel();
    timeout(Duration::from_secs(2), handle).await???;

    assert_eq!(storage.reverts(), vec![Vec::<u64>::new()]);
    assert_eq!(storage.batches(), vec![vec![11], vec![12]]);
    assert_eq!(storage.hash_of(11).as_deref(), Some("11b"));
    Ok(())
}
