//! SignalReader — reads one tick's signal with explicit fallbacks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{SignalError, SignalResult};
use crate::source::{CapacityTarget, QueueDepthSource};

/// The observed signal for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub queue_size: u32,
    pub current_workers: u32,
}

/// Fronts both collaborators with a per-call timeout.
#[derive(Clone)]
pub struct SignalReader {
    queue: Arc<dyn QueueDepthSource>,
    target: Arc<dyn CapacityTarget>,
    timeout: Duration,
}

impl SignalReader {
    pub fn new(
        queue: Arc<dyn QueueDepthSource>,
        target: Arc<dyn CapacityTarget>,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            target,
            timeout,
        }
    }

    /// Read queue depth, then current workers. Never fails.
    pub async fn read(&self, min_workers: u32) -> Signal {
        let queue_size = queue_or_empty(self.bounded(self.queue.queue_depth()).await);
        let current_workers =
            workers_or_floor(self.bounded(self.target.current_count()).await, min_workers);
        Signal {
            queue_size,
            current_workers,
        }
    }

    /// Single attempt at setting the fleet's desired count.
    pub async fn set_desired_count(&self, count: u32) -> SignalResult<()> {
        self.bounded(self.target.set_desired_count(count)).await
    }

    async fn bounded<T, F>(&self, call: F) -> SignalResult<T>
    where
        F: Future<Output = SignalResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SignalError::Timeout(self.timeout)),
        }
    }
}

/// A failed queue read is indistinguishable from an empty queue.
///
/// This keeps the fleet up if the broker API is down, at the cost of
/// building scale-down pressure while it stays down.
pub fn queue_or_empty(result: SignalResult<u32>) -> u32 {
    match result {
        Ok(depth) => depth,
        Err(e) => {
            warn!(error = %e, "queue depth read failed, assuming empty queue");
            0
        }
    }
}

/// A failed worker read falls back to the configured floor.
pub fn workers_or_floor(result: SignalResult<u32>, min_workers: u32) -> u32 {
    match result {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, min_workers, "worker count read failed, assuming min_workers");
            min_workers
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    struct FixedQueue(SignalResult<u32>);

    #[async_trait]
    impl QueueDepthSource for FixedQueue {
        async fn queue_depth(&self) -> SignalResult<u32> {
            match &self.0 {
                Ok(n) => Ok(*n),
                Err(_) => Err(SignalError::Connect("broker down".to_string())),
            }
        }
    }

    struct SlowQueue;

    #[async_trait]
    impl QueueDepthSource for SlowQueue {
        async fn queue_depth(&self) -> SignalResult<u32> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(999)
        }
    }

    #[derive(Default)]
    struct RecordingTarget {
        current: Option<u32>,
        set_calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl CapacityTarget for RecordingTarget {
        async fn current_count(&self) -> SignalResult<u32> {
            self.current
                .ok_or_else(|| SignalError::Status {
                    status: 500,
                    uri: "fake".to_string(),
                })
        }

        async fn set_desired_count(&self, count: u32) -> SignalResult<()> {
            self.set_calls.lock().unwrap().push(count);
            Ok(())
        }
    }

    fn reader(queue: impl QueueDepthSource + 'static, target: RecordingTarget) -> SignalReader {
        SignalReader::new(
            Arc::new(queue),
            Arc::new(target),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn queue_failure_maps_to_zero() {
        assert_eq!(queue_or_empty(Ok(17)), 17);
        assert_eq!(queue_or_empty(Err(SignalError::Decode("x".into()))), 0);
    }

    #[test]
    fn worker_failure_maps_to_floor() {
        assert_eq!(workers_or_floor(Ok(4), 1), 4);
        assert_eq!(workers_or_floor(Err(SignalError::Timeout(Duration::ZERO)), 3), 3);
        assert_eq!(workers_or_floor(Ok(0), 3), 0);
    }

    #[tokio::test]
    async fn read_passes_through_healthy_values() {
        let target = RecordingTarget {
            current: Some(5),
            ..Default::default()
        };
        let signal = reader(FixedQueue(Ok(250)), target).read(1).await;
        assert_eq!(
            signal,
            Signal {
                queue_size: 250,
                current_workers: 5
            }
        );
    }

    #[tokio::test]
    async fn read_applies_both_fallbacks() {
        let queue = FixedQueue(Err(SignalError::Connect(String::new())));
        let signal = reader(queue, RecordingTarget::default()).read(2).await;
        assert_eq!(signal.queue_size, 0);
        assert_eq!(signal.current_workers, 2);
    }

    #[tokio::test]
    async fn slow_source_times_out_as_empty() {
        let target = RecordingTarget {
            current: Some(3),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let signal = reader(SlowQueue, target).read(1).await;

        assert_eq!(signal.queue_size, 0);
        assert_eq!(signal.current_workers, 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn set_desired_count_reaches_target() {
        let target = Arc::new(RecordingTarget::default());
        let reader = SignalReader::new(
            Arc::new(FixedQueue(Ok(0))),
            target.clone(),
            Duration::from_millis(100),
        );

        reader.set_desired_count(6).await.unwrap();
        assert_eq!(*target.set_calls.lock().unwrap(), vec![6]);
    }
}
