pub mod channel;
pub mod executor;
pub mod pipeline;
pub mod poller;
pub mod runtime;

pub use channel::{BoundedChannel, ByteSize, RecvError, SendError};
pub use executor::{Collector, FnCollector, OrderedExecutor, TaskFn, TaskResult};
pub use pipeline::{
    AggregateProcessor, BatchAggregateProcessor, DataSource, OperationFuture, OperationProcessor,
    Pipeline, Processor, ProcessorFuture, RetriableProcessor, RetriableWriter,
    RevertProcessor, RevertableAggregateProcessor, Storage, StorageFuture,
};
pub use poller::{
    Adapter, AdapterFuture, CatchUpPoller, FinalizedPoller, Health, HealthCounter, LatestAdapter,
    LatestPoller, PushOutcome, ReorgWindow, Revertable,
};
pub use runtime::config::{SyncConfig, SyncConfigBuilder, SyncConfigParams};
pub use runtime::fatal::{ContractViolation, FatalErrorHandler};
pub use runtime::runner::Runner;
pub use runtime::state::{PollerState, ReorgSnapshot};
pub use runtime::telemetry::{
    init_tracing, spawn_metrics_reporter, QueueDepth, Telemetry, TelemetrySnapshot,
};
