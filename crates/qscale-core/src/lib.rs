//! qscale-core — configuration shared by every qscale crate.
//!
//! The configuration is loaded once at process start (TOML file, then
//! environment overrides, then CLI flags) and validated into an immutable
//! [`ScalingPolicy`]. Nothing downstream reads the environment.

pub mod config;
pub mod error;

pub use config::{
    QscaleConfig, QueueConfig, RedisConfig, ScalingConfig, ScalingPolicy, StateBackend, StateConfig,
    TargetConfig, TargetKind,
};
pub use error::{ConfigError, ConfigResult};
