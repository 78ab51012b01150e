//! qscale-state — persisted hysteresis state for the autoscaler.
//!
//! Backed by [redb](https://docs.rs/redb) or Redis. The autoscaler only ever keeps a
//! single key here (the instant a pending scale-down was first observed), but
//! the store is a plain string key/value map so operators can inspect it
//! with `qscale timer show`.
//!
//! # Acquisition
//!
//! The store is acquired once per tick through a [`StoreConnector`]. A failed
//! acquisition (missing directory, permissions, Redis down) is not an error for the caller: the autoscaler drops into
//! degraded mode and scales down without a delay. The one exception is
//! [`StateError::Busy`]: the store exists but another process holds it, so
//! the autoscaler defers any scale-down to a later tick.
//!
//! Two backends implement the seam: [`DiskConnector`] (a local redb file)
//! and [`RedisConnector`] (a shared Redis database).

pub mod error;
pub mod redis_store;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use redis_store::RedisConnector;
pub use store::{DiskConnector, StateStore, StoreConnector, TimerStore};
