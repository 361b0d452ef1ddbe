//! Polling state machines that turn an [`Adapter`] into an ordered stream of block data.

pub mod adapter;
pub mod catch_up;
pub mod finalized;
pub mod health;
pub mod latest;
pub mod reorg;

pub use adapter::{Adapter, AdapterFuture, LatestAdapter};
pub use catch_up::CatchUpPoller;
pub use finalized::FinalizedPoller;
pub use health::{Health, HealthCounter};
pub use latest::{LatestPoller, Revertable};
pub use reorg::{PushOutcome, ReorgWindow};

use crate::runtime::retry::sleep_or_cancel;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a single poll iteration.
enum Step {
    /// The cursor moved (forward, or back one block on a reorg).
    Advanced,
    /// The cursor is past the frontier.
    Idle,
}

/// Sleeps for `delay` or until cancelled; the caller's loop observes the token next.
async fn pause(delay: Duration, cancel: &CancellationToken) {
    let _ = sleep_or_cancel(delay, cancel).await;
}
