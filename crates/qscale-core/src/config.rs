//! qscale.toml configuration parser.
//!
//! Every section is optional; missing fields fall back to the defaults the
//! autoscaler has always shipped with (1–20 workers, 200 tasks per worker,
//! 15 minute scale-down delay).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QscaleConfig {
    /// Compute and persist decisions but never call `set_desired_count`.
    pub dry_run: bool,
    /// Upper bound on every collaborator call, in seconds.
    pub request_timeout_secs: u64,
    pub scaling: ScalingConfig,
    pub queue: QueueConfig,
    pub target: TargetConfig,
    pub state: StateConfig,
}

/// Raw scaling bounds as written by the operator. Call
/// [`ScalingConfig::validate`] to obtain a usable [`ScalingPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_workers: u32,
    pub max_workers: u32,
    pub tasks_per_worker: u32,
    pub scale_down_delay_secs: u64,
}

/// RabbitMQ management API coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub host: String,
    pub management_port: u16,
    pub user: String,
    pub password: String,
    pub queue: String,
    /// Virtual host, already URL-encoded (`/` is `%2F`).
    pub vhost: String,
}

/// Which system owns the worker fleet's desired count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// An ECS service's `desiredCount`.
    #[default]
    Ecs,
    /// A deployment on the control-plane REST API.
    ControlPlane,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    pub kind: TargetKind,
    pub ecs_cluster: String,
    pub ecs_service: String,
    pub aws_region: String,
    pub api_url: String,
    pub deployment: String,
}

/// Where the scale-down timer lives.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    /// Local redb file at `path`.
    #[default]
    Redb,
    /// Redis server shared by every host running the autoscaler.
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,
    /// redb file holding the scale-down timer.
    pub path: PathBuf,
    pub timer_key: String,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for QscaleConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            request_timeout_secs: 10,
            scaling: ScalingConfig::default(),
            queue: QueueConfig::default(),
            target: TargetConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 20,
            tasks_per_worker: 200,
            scale_down_delay_secs: 900,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "rabbitmq".to_string(),
            management_port: 80,
            user: "guest".to_string(),
            password: "guest".to_string(),
            queue: "celery".to_string(),
            vhost: "%2F".to_string(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::Ecs,
            ecs_cluster: "my-ecs-cluster".to_string(),
            ecs_service: "my-worker-service".to_string(),
            aws_region: "us-east-1".to_string(),
            api_url: "http://127.0.0.1:8443".to_string(),
            deployment: "default/worker".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Redb,
            path: PathBuf::from("/var/lib/qscale/qscale.redb"),
            timer_key: "qscale:scale_down_time".to_string(),
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 1,
            password: None,
        }
    }
}

impl QscaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: QscaleConfig = toml::from_str(&content)?;
        debug!(?path, "config file loaded");
        Ok(config)
    }

    /// Load the file (if given) and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    ///
    /// Variable names match the ones the worker deployments already export
    /// (`MIN_WORKERS`, `RABBITMQ_HOST`, ...).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MIN_WORKERS") {
            self.scaling.min_workers = parse_env("MIN_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MAX_WORKERS") {
            self.scaling.max_workers = parse_env("MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("TASKS_PER_WORKER") {
            self.scaling.tasks_per_worker = parse_env("TASKS_PER_WORKER", &v)?;
        }
        if let Some(v) = lookup("SCALE_DOWN_DELAY") {
            self.scaling.scale_down_delay_secs = parse_env("SCALE_DOWN_DELAY", &v)?;
        }

        if let Some(v) = lookup("RABBITMQ_HOST") {
            self.queue.host = v;
        }
        if let Some(v) = lookup("RABBITMQ_MANAGEMENT_PORT") {
            self.queue.management_port = parse_env("RABBITMQ_MANAGEMENT_PORT", &v)?;
        }
        if let Some(v) = lookup("RABBITMQ_DEFAULT_USER") {
            self.queue.user = v;
        }
        if let Some(v) = lookup("RABBITMQ_DEFAULT_PASS") {
            self.queue.password = v;
        }
        if let Some(v) = lookup("RABBITMQ_QUEUE_NAME") {
            self.queue.queue = v;
        }
        if let Some(v) = lookup("RABBITMQ_VHOST") {
            self.queue.vhost = v;
        }

        if let Some(v) = lookup("QSCALE_TARGET") {
            self.target.kind = match v.trim().to_ascii_lowercase().as_str() {
                "ecs" => TargetKind::Ecs,
                "control_plane" => TargetKind::ControlPlane,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "QSCALE_TARGET",
                        value: v,
                    });
                }
            };
        }
        if let Some(v) = lookup("ECS_CLUSTER_NAME") {
            self.target.ecs_cluster = v;
        }
        if let Some(v) = lookup("ECS_WORKER_SERVICE") {
            self.target.ecs_service = v;
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.target.aws_region = v;
        }
        if let Some(v) = lookup("QSCALE_API_URL") {
            self.target.api_url = v;
        }
        if let Some(v) = lookup("QSCALE_DEPLOYMENT") {
            self.target.deployment = v;
        }
        if let Some(v) = lookup("QSCALE_STATE_PATH") {
            self.state.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("QSCALE_STATE_BACKEND") {
            self.state.backend = match v.trim().to_ascii_lowercase().as_str() {
                "redb" => StateBackend::Redb,
                "redis" => StateBackend::Redis,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "QSCALE_STATE_BACKEND",
                        value: v,
                    });
                }
            };
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.state.redis.host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.state.redis.port = parse_env("REDIS_PORT", &v)?;
        }
        if let Some(v) = lookup("REDIS_DB") {
            self.state.redis.db = parse_env("REDIS_DB", &v)?;
        }
        if let Some(v) = lookup("REDIS_PASSWORD") {
            self.state.redis.password = Some(v).filter(|p| !p.is_empty());
        }
        if let Some(v) = lookup("QSCALE_TIMER_KEY") {
            self.state.timer_key = v;
        }
        if let Some(v) = lookup("QSCALE_REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_env("QSCALE_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("DRY_RUN") {
            self.dry_run = v.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

// ── Validated policy ───────────────────────────────────────────────

/// Scaling bounds that have passed validation.
///
/// Guarantees `max_workers >= min_workers` and `tasks_per_worker >= 1`,
/// so the target calculation never divides by zero and the clamp range
/// is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    min_workers: u32,
    max_workers: u32,
    tasks_per_worker: u32,
    scale_down_delay: Duration,
}

impl ScalingConfig {
    pub fn validate(&self) -> ConfigResult<ScalingPolicy> {
        if self.max_workers < self.min_workers {
            return Err(ConfigError::MaxBelowMin {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        if self.tasks_per_worker == 0 {
            return Err(ConfigError::ZeroTasksPerWorker);
        }
        Ok(ScalingPolicy {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            tasks_per_worker: self.tasks_per_worker,
            scale_down_delay: Duration::from_secs(self.scale_down_delay_secs),
        })
    }
}

impl ScalingPolicy {
    pub fn min_workers(&self) -> u32 {
        self.min_workers
    }

    pub fn max_workers(&self) -> u32 {
        self.max_workers
    }

    pub fn tasks_per_worker(&self) -> u32 {
        self.tasks_per_worker
    }

    pub fn scale_down_delay(&self) -> Duration {
        self.scale_down_delay
    }
}
