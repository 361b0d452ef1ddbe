use super::processor::Processor;
use super::source::DataSource;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// The consumer loop: pulls every item from a poller's output and hands it to a [`Processor`],
/// one at a time, then closes the processor.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    name: &'static str,
}

impl Pipeline {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs until the source is exhausted or `cancel` fires and returns the number of processed
    /// items. Failures observed after cancellation are not reported.
    #[tracing::instrument(name = "pipeline", skip_all, fields(pipeline = self.name))]
    pub async fn run<T, Src, P>(
        &self,
        mut source: Src,
        mut processor: P,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        Src: DataSource<T>,
        P: Processor<T>,
    {
        let mut processed = 0u64;

        while let Some(item) = source.next(cancel).await {
            if let Err(err) = processor.process(item, cancel).await {
                if cancel.is_cancelled() {
                    tracing::debug!(error = %format!("{err:#}"), "processing interrupted");
                    break;
                }
                return Err(err.context(format!("{} pipeline failed", self.name)));
            }
            processed += 1;
        }

        match processor.close(cancel).await {
            Ok(()) => {}
            Err(err) if cancel.is_cancelled() => {
                tracing::debug!(error = %format!("{err:#}"), "close interrupted");
            }
            Err(err) => {
                return Err(err.context(format!("closing {} pipeline failed", self.name)));
            }
        }

        tracing::info!(
            processed,
            cancelled = cancel.is_cancelled(),
            "pipeline stopped"
        );
        Ok(processed)
    }
}
