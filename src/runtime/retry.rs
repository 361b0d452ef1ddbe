use anyhow::{bail, Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Fixed-interval retry loop bounded only by `cancel`.
///
/// `operation` receives the 1-based attempt number. After each failure `on_failure` observes the
/// error before the loop waits `interval` and tries again.
pub(crate) async fn retry_until_cancelled<T, F, Fut, L>(
    interval: Duration,
    cancel: &CancellationToken,
    mut operation: F,
    mut on_failure: L,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    L: FnMut(u32, &Error),
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            bail!("retry cancelled after {attempt} attempts");
        }
        attempt = attempt.saturating_add(1);

        let failure = tokio::select! {
            _ = cancel.cancelled() => bail!("retry cancelled during attempt {attempt}"),
            outcome = operation(attempt) => match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            },
        };

        on_failure(attempt, &failure);
        sleep_or_cancel(interval, cancel).await?;
    }
}

/// Waits for `delay`. Fails as soon as `cancel` fires.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => bail!("sleep cancelled"),
        _ = sleep(delay) => Ok(()),
    }
}
