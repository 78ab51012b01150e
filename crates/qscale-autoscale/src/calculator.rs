//! Target calculator — queue depth to worker count.

use qscale_core::ScalingPolicy;

/// Backlog size at which a single worker is never enough.
pub const LARGE_BACKLOG: u32 = 100;

/// Worker floor applied once the backlog reaches [`LARGE_BACKLOG`].
pub const LARGE_BACKLOG_FLOOR: u32 = 2;

/// Number of workers needed to serve `queue_size` pending items.
///
/// The large-backlog floor replaces `min_workers` but `max_workers`
/// always has the last word.
pub fn needed_workers(queue_size: u32, policy: &ScalingPolicy) -> u32 {
    let raw = queue_size.div_ceil(policy.tasks_per_worker());
    let floor = if queue_size >= LARGE_BACKLOG {
        LARGE_BACKLOG_FLOOR
    } else {
        policy.min_workers()
    };
    raw.max(floor).min(policy.max_workers())
}
