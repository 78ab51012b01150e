//! qscale-autoscale — queue-driven worker fleet sizing.
//!
//! Each call to [`Autoscaler::evaluate`] is one tick:
//!
//! ```text
//! StoreConnector::connect()          (unreachable → degraded mode,
//!                                     held → scale-down deferred)
//! SignalReader::read()               → queue_size, current_workers
//! needed_workers(queue_size)         → needed
//! hysteresis::plan(current, needed)  → action, timer op, capacity change
//! TimerStore set/delete              (at most one write)
//! CapacityTarget::set_desired_count  (scale_up / executed scale_down only)
//! ```
//!
//! # Scaling Algorithm
//!
//! ```text
//! raw    = ceil(queue_size / tasks_per_worker)
//! floor  = 2 if queue_size >= 100 else min_workers
//! needed = min(max(raw, floor), max_workers)
//!
//! needed >  current → scale up now
//! needed == current → nothing
//! needed <  current → start a timer; scale down once the need has held
//!                     for scale_down_delay without interruption
//! ```
//!
//! The autoscaler has no loop of its own; an external scheduler (cron,
//! systemd timer, a beat task) calls it once per tick, one tick at a time.

pub mod calculator;
pub mod decision;
pub mod hysteresis;
pub mod prometheus;
pub mod scaler;

pub use calculator::needed_workers;
pub use decision::{Decision, MutationOutcome, Note, ScaleAction};
pub use hysteresis::{Plan, TimerOp, TimerView};
pub use prometheus::render_prometheus;
pub use scaler::{Autoscaler, DEFAULT_TIMER_KEY};
