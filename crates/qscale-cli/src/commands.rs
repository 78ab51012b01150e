//! Subcommand bodies.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{info, warn};

use qscale_autoscale::{Autoscaler, Decision, TimerView, needed_workers, render_prometheus};
use qscale_core::{QscaleConfig, StateBackend, TargetKind};
use qscale_signal::{
    CapacityTarget, ControlPlaneTarget, EcsServiceTarget, RabbitQueueSource, SignalReader,
};
use qscale_state::{DiskConnector, RedisConnector, StoreConnector, TimerStore};

use crate::OutputFormat;

async fn capacity_target(config: &QscaleConfig) -> Arc<dyn CapacityTarget> {
    match config.target.kind {
        TargetKind::Ecs => Arc::new(EcsServiceTarget::from_config(&config.target).await),
        TargetKind::ControlPlane => Arc::new(ControlPlaneTarget::new(&config.target)),
    }
}

fn store_connector(config: &QscaleConfig) -> anyhow::Result<Arc<dyn StoreConnector>> {
    Ok(match config.state.backend {
        StateBackend::Redb => Arc::new(DiskConnector::new(config.state.path.clone())),
        StateBackend::Redis => {
            let redis = &config.state.redis;
            Arc::new(RedisConnector::new(
                &redis.host,
                redis.port,
                redis.db,
                redis.password.as_deref(),
                config.request_timeout(),
            )?)
        }
    })
}

/// Build the production autoscaler from a loaded config.
async fn build_autoscaler(config: &QscaleConfig) -> anyhow::Result<Autoscaler> {
    let policy = config.scaling.validate()?;
    let store = store_connector(config)?;
    let queue = Arc::new(RabbitQueueSource::new(&config.queue));
    let target = capacity_target(config).await;
    let signals = SignalReader::new(queue, target, config.request_timeout());

    info!(
        min = policy.min_workers(),
        max = policy.max_workers(),
        tasks_per_worker = policy.tasks_per_worker(),
        delay_secs = policy.scale_down_delay().as_secs(),
        target = ?config.target.kind,
        state = ?config.state.backend,
        dry_run = config.dry_run,
        "autoscaler configured"
    );

    Ok(Autoscaler::new(policy, signals, store)
        .with_timer_key(config.state.timer_key.clone())
        .with_dry_run(config.dry_run))
}

pub(crate) async fn evaluate(
    config: &QscaleConfig,
    format: OutputFormat,
    prometheus_out: Option<&Path>,
) -> anyhow::Result<()> {
    let autoscaler = build_autoscaler(config).await?;
    let decision = autoscaler.evaluate().await;

    print_decision(&decision, format)?;

    if let Some(path) = prometheus_out {
        if let Err(e) = write_textfile(path, &render_prometheus(&decision)) {
            warn!(path = %path.display(), error = %e, "failed to write prometheus textfile");
        }
    }
    Ok(())
}

fn print_decision(decision: &Decision, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("Result: {decision}"),
        OutputFormat::Json => println!("{}", serde_json::to_string(decision)?),
    }
    Ok(())
}

/// Write through a temp file so a scraper never reads a partial file.
fn write_textfile(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

pub(crate) fn calc(config: &QscaleConfig, queue: u32) -> anyhow::Result<()> {
    let policy = config.scaling.validate()?;
    println!("{}", needed_workers(queue, &policy));
    Ok(())
}

fn open_timer_store(config: &QscaleConfig) -> anyhow::Result<Box<dyn TimerStore>> {
    let location = match config.state.backend {
        StateBackend::Redb => config.state.path.display().to_string(),
        StateBackend::Redis => {
            let redis = &config.state.redis;
            format!("redis {}:{}/{}", redis.host, redis.port, redis.db)
        }
    };
    store_connector(config)?
        .connect()
        .with_context(|| format!("opening timer store {location}"))
}

pub(crate) fn timer_show(config: &QscaleConfig) -> anyhow::Result<()> {
    let policy = config.scaling.validate()?;
    let store = open_timer_store(config)?;
    let raw = store.get(&config.state.timer_key)?;

    match TimerView::from_stored(raw.as_deref()) {
        TimerView::Idle => println!("no scale-down pending"),
        TimerView::Pending { started_at } => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            let elapsed = (now - started_at).max(0.0);
            let remaining = (policy.scale_down_delay().as_secs_f64() - elapsed).max(0.0);
            println!(
                "scale-down pending since {started_at:.0} ({elapsed:.0}s elapsed, {remaining:.0}s remaining)"
            );
        }
        TimerView::Corrupt(value) => {
            println!("invalid timer value {value:?}, the next scale-down tick resets it")
        }
        TimerView::Unavailable | TimerView::Busy => println!("timer store unavailable"),
    }
    Ok(())
}

pub(crate) fn timer_clear(config: &QscaleConfig) -> anyhow::Result<()> {
    let store = open_timer_store(config)?;
    if store.delete(&config.state.timer_key)? {
        info!(key = %config.state.timer_key, "scale-down timer cleared");
        println!("scale-down timer cleared");
    } else {
        println!("no scale-down timer set");
    }
    Ok(())
}

pub(crate) fn show_config(config: &QscaleConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if !shown.queue.password.is_empty() {
        shown.queue.password = "********".to_string();
    }
    if shown.state.redis.password.is_some() {
        shown.state.redis.password = Some("********".to_string());
    }
    print!("{}", shown.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textfile_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qscale.prom");

        write_textfile(&path, "qscale_queue_size 1\n").unwrap();
        write_textfile(&path, "qscale_queue_size 2\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "qscale_queue_size 2\n"
        );
        assert!(!dir.path().join("qscale.prom.tmp").exists());
    }

    #[test]
    fn timer_clear_then_show_on_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QscaleConfig::default();
        config.state.path = dir.path().join("state").join("qscale.redb");

        {
            let store = open_timer_store(&config).unwrap();
            store.set(&config.state.timer_key, "1700000000.000000").unwrap();
        }
        timer_clear(&config).unwrap();

        let store = open_timer_store(&config).unwrap();
        assert!(store.get(&config.state.timer_key).unwrap().is_none());
    }

    #[test]
    fn invalid_policy_is_a_startup_error_for_calc() {
        let mut config = QscaleConfig::default();
        config.scaling.min_workers = 5;
        config.scaling.max_workers = 2;
        assert!(calc(&config, 10).is_err());
    }

    #[tokio::test]
    async fn invalid_policy_fails_before_building_collaborators() {
        let mut config = QscaleConfig::default();
        config.scaling.tasks_per_worker = 0;
        assert!(build_autoscaler(&config).await.is_err());
    }

    #[test]
    fn timer_commands_report_a_held_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QscaleConfig::default();
        config.state.path = dir.path().join("qscale.redb");

        let _held = open_timer_store(&config).unwrap();
        let err = timer_clear(&config).unwrap_err();
        assert!(format!("{err:#}").contains("held by another process"));
    }
}
