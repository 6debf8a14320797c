// Parallel Dispatcher
// Runs per-family work on a bounded pool with fail-fast semantics

use crate::error::{PipelineError, PipelineResult};

use std::any::Any;
use std::future::Future;
use tokio::task::{JoinError, JoinSet};

/// Bounded worker pool for independent work items
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher running at most `workers` items at once (minimum 1)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` for every item and return the results in input order.
    ///
    /// With one worker the items run one after another on the calling task.
    /// Otherwise each item is spawned, with at most `workers` in flight. Once
    /// an item fails no further items are started; items already running
    /// are awaited and their results discarded, and the first observed error
    /// is returned. A successful run must have attempted exactly `expected`
    /// items.
    pub async fn dispatch<T, R, F, Fut>(
        &self,
        label: &str,
        items: Vec<T>,
        expected: usize,
        work: F,
    ) -> PipelineResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = PipelineResult<R>> + Send + 'static,
    {
        tracing::debug!(label, items = items.len(), workers = self.workers, "dispatching");

        let (attempted, results) = if self.workers == 1 {
            self.run_sequential(items, work).await?
        } else {
            self.run_parallel(label, items, work).await?
        };

        if attempted != expected {
            return Err(PipelineError::count_mismatch(
                expected,
                attempted,
                format!("dispatched for {}", label),
            ));
        }
        Ok(results)
    }

    async fn run_sequential<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        work: F,
    ) -> PipelineResult<(usize, Vec<R>)>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(work(item).await?);
        }
        Ok((results.len(), results))
    }

    async fn run_parallel<T, R, F, Fut>(
        &self,
        label: &str,
        items: Vec<T>,
        work: F,
    ) -> PipelineResult<(usize, Vec<R>)>
    where
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = PipelineResult<R>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        let mut collector = Collector::new(label, items.len());
        let mut attempted = 0;

        for (index, item) in items.into_iter().enumerate() {
            while set.len() >= self.workers {
                match set.join_next().await {
                    Some(joined) => collector.collect(joined),
                    None => break,
                }
            }
            while let Some(joined) = set.try_join_next() {
                collector.collect(joined);
            }
            if collector.failed() {
                break;
            }

            attempted += 1;
            let future = work(item);
            set.spawn(async move { (index, future.await) });
        }

        // Drain in-flight items; nothing is cancelled
        while let Some(joined) = set.join_next().await {
            collector.collect(joined);
        }

        collector.finish().map(|results| (attempted, results))
    }
}

/// Aggregates joined results by return value
struct Collector<'a, R> {
    label: &'a str,
    results: Vec<(usize, R)>,
    first_error: Option<PipelineError>,
}

impl<'a, R> Collector<'a, R> {
    fn new(label: &'a str, capacity: usize) -> Self {
        Self {
            label,
            results: Vec::with_capacity(capacity),
            first_error: None,
        }
    }

    fn failed(&self) -> bool {
        self.first_error.is_some()
    }

    fn collect(&mut self, joined: Result<(usize, PipelineResult<R>), JoinError>) {
        let error = match joined {
            Ok((index, Ok(result))) => {
                self.results.push((index, result));
                return;
            }
            Ok((_, Err(e))) => e,
            Err(e) => PipelineError::WorkerPanicked {
                label: self.label.to_string(),
                message: join_error_message(e),
            },
        };

        if self.first_error.is_none() {
            self.first_error = Some(error);
        } else {
            tracing::debug!(label = self.label, error = %error, "discarding error after first failure");
        }
    }

    fn finish(self) -> PipelineResult<Vec<R>> {
        if let Some(error) = self.first_error {
            return Err(error);
        }
        let mut results = self.results;
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }
}

fn join_error_message(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic())
    } else {
        error.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let dispatcher = Dispatcher::new(1);
        let results = dispatcher
            .dispatch("test", vec![3, 1, 2], 3, |n| async move { Ok::<_, PipelineError>(n * 10) })
            .await
            .unwrap();
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        let dispatcher = Dispatcher::new(4);
        let results = dispatcher
            .dispatch("test", (0..10u64).collect(), 10, |n| async move {
                // Later items finish first
                tokio::time::sleep(Duration::from_millis(20 - 2 * n)).await;
                Ok::<_, PipelineError>(n)
            })
            .await
            .unwrap();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_parallel_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let dispatcher = Dispatcher::new(3);
        dispatcher
            .dispatch("test", (0..12).collect::<Vec<_>>(), 12, |_| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, PipelineError>(())
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_new_work() {
        for workers in [1, 2] {
            let started = Arc::new(AtomicUsize::new(0));
            let dispatcher = Dispatcher::new(workers);

            let err = dispatcher
                .dispatch("test", (0..10).collect::<Vec<_>>(), 10, |n| {
                    let started = started.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        if n == 0 {
                            return Err(PipelineError::msa("fam0", "broken"));
                        }
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(n)
                    }
                })
                .await
                .unwrap_err();

            assert_eq!(err.family(), Some("fam0"));
            assert!(started.load(Ordering::SeqCst) <= workers);
        }
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let dispatcher = Dispatcher::new(2);
        let err = dispatcher
            .dispatch("phylogeny", vec![0, 1], 2, |n| async move {
                if n == 1 {
                    panic!("worker exploded");
                }
                Ok::<_, PipelineError>(n)
            })
            .await
            .unwrap_err();

        match err {
            PipelineError::WorkerPanicked { label, message } => {
                assert_eq!(label, "phylogeny");
                assert_eq!(message, "worker exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_count_mismatch() {
        for workers in [1, 3] {
            let err = Dispatcher::new(workers)
                .dispatch("coevolution", vec![1, 2], 3, |n| async move { Ok::<_, PipelineError>(n) })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CountMismatch);
            assert!(err.to_string().contains("expected 3 families but 2"));
        }
    }

    #[test]
    fn test_zero_workers_is_sequential() {
        assert_eq!(Dispatcher::new(0).workers(), 1);
    }
}
