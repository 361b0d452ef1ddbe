//! Ordered-parallel execution: many concurrent fetches, results delivered strictly
//! in task order to a single collector.

mod ordered;
pub mod pool;
pub mod task;

pub use pool::OrderedExecutor;
pub use task::{CollectFuture, Collector, FnCollector, TaskFn, TaskFuture, TaskResult};
