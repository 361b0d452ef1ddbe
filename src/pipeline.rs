//! Consumer side of a sync: turns polled block data into committed storage operations.

pub mod aggregate;
pub mod batch;
pub mod consumer;
pub mod processor;
pub mod retriable;
pub mod revertable;
pub mod source;
pub mod storage;

pub use aggregate::AggregateProcessor;
pub use batch::BatchAggregateProcessor;
pub use consumer::Pipeline;
pub use processor::{
    OperationFuture, OperationProcessor, Processor, ProcessorFuture, RevertProcessor,
};
pub use retriable::{RetriableProcessor, RetriableWriter};
pub use revertable::RevertableAggregateProcessor;
pub use source::{DataSource, SourceFuture};
pub use storage::{Storage, StorageFuture};
