//! qscale — queue-driven worker autoscaler.
//!
//! One invocation is one tick. Run it from cron, a systemd timer, or a
//! beat task; ticks must not overlap.
//!
//! # Usage
//!
//! ```text
//! qscale evaluate --config /etc/qscale/qscale.toml --prometheus-out /var/lib/node_exporter/qscale.prom
//! qscale calc --queue 4500
//! qscale timer show
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use qscale_core::QscaleConfig;

#[derive(Parser)]
#[command(name = "qscale", about = "Queue-driven worker autoscaler", version)]
struct Cli {
    /// TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one autoscaling tick.
    Evaluate {
        /// Decide and persist the timer, but never change capacity.
        #[arg(long)]
        dry_run: bool,

        /// Decision output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the decision as Prometheus gauges to this file.
        #[arg(long)]
        prometheus_out: Option<PathBuf>,
    },
    /// Print the worker count a queue depth calls for.
    Calc {
        /// Ready messages in the queue.
        #[arg(long)]
        queue: u32,
    },
    /// Inspect or clear the persisted scale-down timer.
    Timer {
        #[command(subcommand)]
        action: TimerCommand,
    },
    /// Print the effective configuration (file + environment).
    Config,
}

#[derive(Subcommand)]
enum TimerCommand {
    /// Show whether a scale-down is pending and for how long.
    Show,
    /// Delete the timer so the next scale-down starts a fresh delay.
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = QscaleConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Evaluate {
            dry_run,
            format,
            prometheus_out,
        } => {
            if dry_run {
                config.dry_run = true;
            }
            commands::evaluate(&config, format, prometheus_out.as_deref()).await
        }
        Command::Calc { queue } => commands::calc(&config, queue),
        Command::Timer { action } => match action {
            TimerCommand::Show => commands::timer_show(&config),
            TimerCommand::Clear => commands::timer_clear(&config),
        },
        Command::Config => commands::show_config(&config),
    }
}

/// Logs go to stderr so stdout carries only the decision.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qscale=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
