//! qscale-signal — the autoscaler's view of the outside world.
//!
//! Two collaborators feed every tick:
//!
//! ```text
//! QueueDepthSource  ── queue_depth() ──────────┐
//!                                               ├─► SignalReader::read() → Signal
//! CapacityTarget    ── current_count() ────────┘
//!                   ◄─ set_desired_count(n) ── SignalReader::set_desired_count()
//! ```
//!
//! Adapters return explicit `SignalResult`s. The reader owns the fallback
//! policy: a failed queue read counts as an empty queue, a failed worker
//! read counts as `min_workers`. Every call is bounded by a single timeout
//! and attempted once.
//!
//! Queue depth comes from the RabbitMQ management API
//! ([`RabbitQueueSource`]). The fleet is either an ECS service
//! ([`EcsServiceTarget`]) or a control-plane deployment
//! ([`ControlPlaneTarget`]).

mod client;
pub mod control_plane;
pub mod ecs;
pub mod error;
pub mod rabbitmq;
pub mod reader;
pub mod source;

pub use control_plane::ControlPlaneTarget;
pub use ecs::EcsServiceTarget;
pub use error::{SignalError, SignalResult};
pub use rabbitmq::RabbitQueueSource;
pub use reader::{Signal, SignalReader, queue_or_empty, workers_or_floor};
pub use source::{CapacityTarget, QueueDepthSource};
