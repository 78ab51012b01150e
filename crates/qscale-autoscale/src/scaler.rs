//! Autoscaler — one queue-driven scaling decision per call.
//!
//! Reads the signal, sizes the fleet, runs the hysteresis controller
//! against the persisted timer, and (when the decision calls for it)
//! pushes the new desired count to the capacity target. Nothing in here
//! returns an error: every collaborator failure degrades to a documented
//! fallback and shows up in the [`Decision`] or the logs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use qscale_core::ScalingPolicy;
use qscale_signal::SignalReader;
use qscale_state::{StateError, StoreConnector, TimerStore};

use crate::calculator::needed_workers;
use crate::decision::{Decision, MutationOutcome, ScaleAction};
use crate::hysteresis::{self, TimerOp, TimerView};

/// Timer key used when none is configured.
pub const DEFAULT_TIMER_KEY: &str = "qscale:scale_down_time";

/// Queue-driven autoscaler for a single worker fleet.
///
/// Ticks must not overlap: the timer key is read and rewritten without
/// any compare-and-set.
pub struct Autoscaler {
    policy: ScalingPolicy,
    signals: SignalReader,
    store: Arc<dyn StoreConnector>,
    timer_key: String,
    dry_run: bool,
}

impl Autoscaler {
    pub fn new(
        policy: ScalingPolicy,
        signals: SignalReader,
        store: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            policy,
            signals,
            store,
            timer_key: DEFAULT_TIMER_KEY.to_string(),
            dry_run: false,
        }
    }

    pub fn with_timer_key(mut self, key: impl Into<String>) -> Self {
        self.timer_key = key.into();
        self
    }

    /// In dry-run mode the capacity target is never written. Timer
    /// handling is unchanged, so dry-run ticks advance the delay exactly
    /// as live ticks would.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Run one tick against the wall clock.
    pub async fn evaluate(&self) -> Decision {
        self.evaluate_at(SystemTime::now()).await
    }

    /// Run one tick as if the current time were `now`.
    pub async fn evaluate_at(&self, now: SystemTime) -> Decision {
        let acquired = match self.store.connect() {
            Ok(store) => Acquired::Ready(store),
            Err(StateError::Busy(holder)) => {
                warn!(store = %holder, "timer store busy, any scale-down is deferred");
                Acquired::Busy
            }
            Err(e) => {
                warn!(error = %e, "timer store unavailable, scale-down delay not enforced");
                Acquired::Unavailable
            }
        };

        let signal = self.signals.read(self.policy.min_workers()).await;
        let queue = signal.queue_size;
        let current = signal.current_workers;
        let needed = needed_workers(queue, &self.policy);

        info!(
            queue,
            current,
            needed,
            min = self.policy.min_workers(),
            max = self.policy.max_workers(),
            "autoscaling"
        );

        let now_secs = epoch_secs(now);
        let plan = hysteresis::plan(
            current,
            needed,
            now_secs,
            self.policy.scale_down_delay(),
            || self.read_timer(&acquired),
        );

        // Commit the timer before touching capacity: a failed mutation
        // must not undo a decision that has already been made.
        self.commit_timer(acquired.store(), plan.timer, now_secs);

        let mutation = match plan.apply {
            Some(count) => Some(self.apply(count).await),
            None => None,
        };

        let decision = Decision {
            queue,
            needed,
            action: plan.action,
            mutation,
        };
        log_decision(&decision, self.policy.scale_down_delay().as_secs());
        decision
    }

    fn read_timer(&self, acquired: &Acquired) -> TimerView {
        let store = match acquired {
            Acquired::Ready(store) => store,
            Acquired::Busy => return TimerView::Busy,
            Acquired::Unavailable => return TimerView::Unavailable,
        };
        match store.get(&self.timer_key) {
            Ok(value) => {
                let view = TimerView::from_stored(value.as_deref());
                if let TimerView::Corrupt(raw) = &view {
                    error!(key = %self.timer_key, value = %raw, "invalid scale-down timer value, resetting");
                }
                view
            }
            Err(e) => {
                warn!(error = %e, key = %self.timer_key, "timer read failed, treating store as unavailable");
                TimerView::Unavailable
            }
        }
    }

    fn commit_timer(&self, store: Option<&dyn TimerStore>, op: TimerOp, now_secs: f64) {
        let Some(store) = store else {
            return;
        };
        let result = match op {
            TimerOp::Leave => return,
            TimerOp::Start => store.set(&self.timer_key, &hysteresis::format_timestamp(now_secs)),
            TimerOp::Clear => store.delete(&self.timer_key).map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, key = %self.timer_key, ?op, "timer write failed");
        }
    }

    async fn apply(&self, count: u32) -> MutationOutcome {
        if self.dry_run {
            info!(count, "[dry run] would scale workers");
            return MutationOutcome::DryRun;
        }
        match self.signals.set_desired_count(count).await {
            Ok(()) => {
                info!(count, "scaled workers");
                MutationOutcome::Applied
            }
            Err(e) => {
                warn!(count, error = %e, "scaling failed, next tick will retry");
                MutationOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Outcome of acquiring the timer store for one tick.
enum Acquired {
    Ready(Box<dyn TimerStore>),
    Busy,
    Unavailable,
}

impl Acquired {
    fn store(&self) -> Option<&dyn TimerStore> {
        match self {
            Self::Ready(store) => Some(store.as_ref()),
            Self::Busy | Self::Unavailable => None,
        }
    }
}

fn log_decision(decision: &Decision, delay_secs: u64) {
    match &decision.action {
        ScaleAction::NoChange { workers } => {
            info!(workers, queue = decision.queue, "no scaling needed");
        }
        ScaleAction::ScaleUp { from, to } => {
            info!(from, to, queue = decision.queue, "scaled up");
        }
        ScaleAction::ScaleDownDelayed { workers, target } => {
            info!(
                from = workers,
                to = target,
                delay_secs,
                "scale-down timer started, will scale down if queue remains low"
            );
        }
        ScaleAction::ScaleDownWaiting { from, to, remaining } => {
            info!(
                from,
                to,
                remaining_secs = remaining.round() as u64,
                "scale-down waiting"
            );
        }
        ScaleAction::ScaleDown { from, to, note: Some(_) } => {
            warn!(from, to, "scale-down executed without delay (store unavailable)");
        }
        ScaleAction::ScaleDown { from, to, note: None } => {
            info!(from, to, delay_secs, "scale-down executed");
        }
        ScaleAction::ScaleDownTimerReset { workers } => {
            info!(workers, "scale-down timer reset");
        }
        ScaleAction::ScaleDownDeferred { from, to } => {
            info!(from, to, "scale-down deferred, timer store held elsewhere");
        }
    }
}

fn epoch_secs(now: SystemTime) -> f64 {
    now.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
