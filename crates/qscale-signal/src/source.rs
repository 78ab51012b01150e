//! Collaborator contracts.

use async_trait::async_trait;

use crate::error::SignalResult;

/// Reports how many work items are waiting for a worker.
#[async_trait]
pub trait QueueDepthSource: Send + Sync {
    async fn queue_depth(&self) -> SignalResult<u32>;
}

/// The system that owns the worker fleet's desired count.
///
/// `set_desired_count` must be idempotent: the autoscaler may set the same
/// value on consecutive ticks after a failed mutation.
#[async_trait]
pub trait CapacityTarget: Send + Sync {
    async fn current_count(&self) -> SignalResult<u32>;

    async fn set_desired_count(&self, count: u32) -> SignalResult<()>;
}
