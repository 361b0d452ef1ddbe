use crate::channel::BYTES_PER_MEGABYTE;
use crate::runtime::telemetry;
use anyhow::{bail, Result};
use std::time::Duration;

const DEFAULT_IDLE_INTERVAL_SECS: u64 = 5;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 1;
const DEFAULT_UNHEALTHY_AFTER_SECS: u64 = 60;
const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;
const DEFAULT_CHANNEL_MAX_SIZE_MB: usize = 256;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_INTERVAL_SECS: u64 = 10;
const DEFAULT_STREAM_BUFFER: usize = 16;

/// Runtime configuration shared by pollers and processing pipelines.
///
/// All instances must be constructed via [`SyncConfig::builder`] or [`SyncConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    idle_interval: Duration,
    retry_interval: Duration,
    unhealthy_after: Duration,
    catch_up_routines: Option<usize>,
    catch_up_window: Option<usize>,
    catch_up_max_range: Option<u64>,
    channel_capacity: usize,
    channel_max_size_mb: usize,
    batch_size: usize,
    batch_interval: Duration,
    latest_confirmations: u64,
    stream_buffer: usize,
    metrics_interval: Duration,
}

pub struct SyncConfigParams {
    pub idle_interval: Duration,
    pub retry_interval: Duration,
    pub unhealthy_after: Duration,
    pub catch_up_routines: Option<usize>,
    pub catch_up_window: Option<usize>,
    pub catch_up_max_range: Option<u64>,
    pub channel_capacity: usize,
    pub channel_max_size_mb: usize,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub latest_confirmations: u64,
    pub stream_buffer: usize,
    pub metrics_interval: Duration,
}

impl SyncConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: SyncConfigParams) -> Result<Self> {
        let SyncConfigParams {
            idle_interval,
            retry_interval,
            unhealthy_after,
            catch_up_routines,
            catch_up_window,
            catch_up_max_range,
            channel_capacity,
            channel_max_size_mb,
            batch_size,
            batch_interval,
            latest_confirmations,
            stream_buffer,
            metrics_interval,
        } = params;

        let config = Self {
            idle_interval,
            retry_interval,
            unhealthy_after,
            catch_up_routines,
            catch_up_window,
            catch_up_max_range,
            channel_capacity,
            channel_max_size_mb,
            batch_size,
            batch_interval,
            latest_confirmations,
            stream_buffer,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Sleep between polls when the cursor is ahead of the frontier.
    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    /// Sleep between attempts after a transient failure.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// How long a failure streak may last before it is reported as unhealthy.
    pub fn unhealthy_after(&self) -> Duration {
        self.unhealthy_after
    }

    /// Worker count for catch-up fetching; `None` uses the available parallelism.
    pub fn catch_up_routines(&self) -> Option<usize> {
        self.catch_up_routines
    }

    /// Maximum catch-up tasks in flight ahead of delivery; `None` disables the window.
    pub fn catch_up_window(&self) -> Option<usize> {
        self.catch_up_window
    }

    /// Maximum number of blocks fetched per catch-up round; `None` fetches up to the frontier.
    pub fn catch_up_max_range(&self) -> Option<u64> {
        self.catch_up_max_range
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn channel_max_size_mb(&self) -> usize {
        self.channel_max_size_mb
    }

    pub fn channel_max_bytes(&self) -> usize {
        self.channel_max_size_mb.saturating_mul(BYTES_PER_MEGABYTE)
    }

    /// Items accumulated by a batch processor before it commits.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Age after which a batch processor commits on the next arrival.
    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    /// Blocks kept behind the reported latest block by the latest poller.
    pub fn latest_confirmations(&self) -> u64 {
        self.latest_confirmations
    }

    /// Buffer of the finalized/latest poller output streams.
    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.idle_interval.is_zero() {
            bail!("idle_interval must be greater than 0");
        }

        if self.retry_interval.is_zero() {
            bail!("retry_interval must be greater than 0");
        }

        if self.unhealthy_after.is_zero() {
            bail!("unhealthy_after must be greater than 0");
        }

        if self.catch_up_routines == Some(0) {
            bail!("catch_up_routines must be greater than 0");
        }

        if self.catch_up_window == Some(0) {
            bail!("catch_up_window must be greater than 0");
        }

        if self.catch_up_max_range == Some(0) {
            bail!("catch_up_max_range must be greater than 0");
        }

        if self.channel_capacity == 0 {
            bail!("channel_capacity must be greater than 0");
        }

        if self.channel_max_size_mb == 0 {
            bail!("channel_max_size_mb must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.batch_interval.is_zero() {
            bail!("batch_interval must be greater than 0");
        }

        if self.stream_buffer == 0 {
            bail!("stream_buffer must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(DEFAULT_IDLE_INTERVAL_SECS),
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            unhealthy_after: Duration::from_secs(DEFAULT_UNHEALTHY_AFTER_SECS),
            catch_up_routines: None,
            catch_up_window: None,
            catch_up_max_range: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            channel_max_size_mb: DEFAULT_CHANNEL_MAX_SIZE_MB,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: Duration::from_secs(DEFAULT_BATCH_INTERVAL_SECS),
            latest_confirmations: 0,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            metrics_interval: telemetry::DEFAULT_METRICS_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SyncConfigBuilder {
    idle_interval: Option<Duration>,
    retry_interval: Option<Duration>,
    unhealthy_after: Option<Duration>,
    catch_up_routines: Option<usize>,
    catch_up_window: Option<usize>,
    catch_up_max_range: Option<u64>,
    channel_capacity: Option<usize>,
    channel_max_size_mb: Option<usize>,
    batch_size: Option<usize>,
    batch_interval: Option<Duration>,
    latest_confirmations: Option<u64>,
    stream_buffer: Option<usize>,
    metrics_interval: Option<Duration>,
}

impl SyncConfigBuilder {
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = Some(interval);
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn unhealthy_after(mut self, threshold: Duration) -> Self {
        self.unhealthy_after = Some(threshold);
        self
    }

    pub fn catch_up_routines(mut self, routines: usize) -> Self {
        self.catch_up_routines = Some(routines);
        self
    }

    pub fn catch_up_window(mut self, window: usize) -> Self {
        self.catch_up_window = Some(window);
        self
    }

    pub fn catch_up_max_range(mut self, blocks: u64) -> Self {
        self.catch_up_max_range = Some(blocks);
        self
    }

    pub fn channel_capacity(mut self, items: usize) -> Self {
        self.channel_capacity = Some(items);
        self
    }

    pub fn channel_max_size_mb(mut self, megabytes: usize) -> Self {
        self.channel_max_size_mb = Some(megabytes);
        self
    }

    pub fn batch_size(mut self, items: usize) -> Self {
        self.batch_size = Some(items);
        self
    }

    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = Some(interval);
        self
    }

    pub fn latest_confirmations(mut self, blocks: u64) -> Self {
        self.latest_confirmations = Some(blocks);
        self
    }

    pub fn stream_buffer(mut self, items: usize) -> Self {
        self.stream_buffer = Some(items);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<SyncConfig> {
        let defaults = SyncConfig::default();
        let params = SyncConfigParams {
            idle_interval: self.idle_interval.unwrap_or(defaults.idle_interval),
            retry_interval: self.retry_interval.unwrap_or(defaults.retry_interval),
            unhealthy_after: self.unhealthy_after.unwrap_or(defaults.unhealthy_after),
            catch_up_routines: self.catch_up_routines,
            catch_up_window: self.catch_up_window,
            catch_up_max_range: self.catch_up_max_range,
            channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity),
            channel_max_size_mb: self
                .channel_max_size_mb
                .unwrap_or(defaults.channel_max_size_mb),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            batch_interval: self.batch_interval.unwrap_or(defaults.batch_interval),
            latest_confirmations: self
                .latest_confirmations
                .unwrap_or(defaults.latest_confirmations),
            stream_buffer: self.stream_buffer.unwrap_or(defaults.stream_buffer),
            metrics_interval: self.metrics_interval.unwrap_or(defaults.metrics_interval),
        };

        SyncConfig::new(params)
    }
}
