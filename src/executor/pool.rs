//! Worker pool that runs indexed tasks concurrently while handing their results to a single
//! collector in index order.

use super::ordered::OrderedResults;
use super::task::{Collector, TaskFn, TaskResult};
use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type WorkerMessage<V> = (usize, usize, Result<V>);

/// Runs `tasks` independent tasks on a pool of `routines` workers and delivers each completed task
/// to a [`Collector`] strictly in order `0, 1, ..., tasks - 1`.
///
/// Without a window, a new task is dispatched every time any result arrives, so fast tasks may
/// pile up behind a slow one. With a window, at most `window` tasks are in flight or buffered
/// ahead of the oldest undelivered result; the window is normalized to `routines..=tasks`.
///
/// The first failure from a task or from the collector cancels every worker and is returned.
#[derive(Debug, Clone)]
pub struct OrderedExecutor {
    tasks: usize,
    routines: Option<usize>,
    window: Option<usize>,
}

impl OrderedExecutor {
    pub fn new(tasks: usize) -> Self {
        Self {
            tasks,
            routines: None,
            window: None,
        }
    }

    /// Overrides the pool size. Defaults to the available parallelism.
    pub fn routines(mut self, routines: usize) -> Self {
        self.routines = Some(routines);
        self
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    pub fn tasks(&self) -> usize {
        self.tasks
    }

    pub fn effective_routines(&self) -> usize {
        let requested = self.routines.unwrap_or_else(default_parallelism);
        requested.max(1).min(self.tasks.max(1))
    }

    pub fn effective_window(&self) -> Option<usize> {
        let routines = self.effective_routines();
        self.window
            .map(|window| window.clamp(routines, self.tasks.max(routines)))
    }

    pub async fn run<V, D, C>(
        &self,
        task: D,
        collector: &mut C,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        V: Send + 'static,
        D: TaskFn<V>,
        C: Collector<V> + ?Sized,
    {
        let tasks = self.tasks;
        if tasks == 0 {
            return Ok(());
        }

        let routines = self.effective_routines();
        let window = self.effective_window();
        tracing::debug!(tasks, routines, window = ?window, "starting ordered executor batch");

        let batch_token = cancel.child_token();
        let task = Arc::new(task);
        let (index_tx, index_rx) = mpsc::unbounded_channel::<usize>();
        let index_rx = Arc::new(Mutex::new(index_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<WorkerMessage<V>>();

        let workers: Vec<JoinHandle<()>> = (0..routines)
            .map(|routine| {
                spawn_worker(
                    routine,
                    Arc::clone(&task),
                    Arc::clone(&index_rx),
                    result_tx.clone(),
                    batch_token.clone(),
                )
            })
            .collect();
        drop(result_tx);

        let mut dispatched = 0usize;
        let initial = window.unwrap_or(routines).min(tasks);
        while dispatched < initial {
            let _ = index_tx.send(dispatched);
            dispatched += 1;
        }

        let mut ordered = OrderedResults::new();
        let mut collected = 0usize;

        let outcome = loop {
            if collected == tasks {
                break Ok(());
            }

            let received = tokio::select! {
                _ = batch_token.cancelled() => break Err(anyhow!("ordered executor cancelled")),
                received = result_rx.recv() => received,
            };

            let Some((routine, index, outcome)) = received else {
                break Err(anyhow!(
                    "executor workers exited with {} of {tasks} tasks collected",
                    collected
                ));
            };

            let value = match outcome {
                Ok(value) => value,
                Err(err) => {
                    break Err(err.context(format!("task {index} failed on routine {routine}")));
                }
            };

            ordered.insert(TaskResult {
                routine,
                index,
                value,
            });

            if window.is_none() && dispatched < tasks {
                let _ = index_tx.send(dispatched);
                dispatched += 1;
            }

            let mut failure = None;
            while let Some(ready) = ordered.pop_ready() {
                let index = ready.index;
                if let Err(err) = collector.collect(ready).await {
                    failure = Some(err.context(format!("collecting task {index} failed")));
                    break;
                }
                collected += 1;

                if window.is_some() && dispatched < tasks {
                    let _ = index_tx.send(dispatched);
                    dispatched += 1;
                }
            }

            if let Some(err) = failure {
                break Err(err);
            }
        };

        batch_token.cancel();
        drop(index_tx);
        for (routine, handle) in workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(routine, error = %err, "executor worker did not shut down cleanly");
            }
        }

        if let Err(err) = &outcome {
            tracing::warn!(
                tasks,
                collected,
                buffered = ordered.len(),
                error = %err,
                "ordered executor batch aborted"
            );
        }

        outcome
    }
}

fn spawn_worker<V, D>(
    routine: usize,
    task: Arc<D>,
    index_rx: Arc<Mutex<mpsc::UnboundedReceiver<usize>>>,
    result_tx: mpsc::UnboundedSender<WorkerMessage<V>>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    V: Send + 'static,
    D: TaskFn<V>,
{
    tokio::spawn(async move {
        loop {
            let next = {
                let mut guard = index_rx.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => None,
                    index = guard.recv() => index,
                }
            };
            let Some(index) = next else {
                break;
            };

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = AssertUnwindSafe(task.call(routine, index)).catch_unwind() => outcome,
            };
            let outcome = outcome.unwrap_or_else(|panic| {
                Err(anyhow!(
                    "task {index} panicked: {}",
                    panic_message(panic.as_ref())
                ))
            });

            if result_tx.send((routine, index, outcome)).is_err() {
                break;
            }
        }
    })
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
