//! Hysteresis controller — asymmetric scale-up / scale-down policy.
//!
//! Scale-up is immediate. Scale-down waits until the need to shrink has
//! held, uninterrupted, for the configured delay. The only state that
//! survives between ticks is the instant the current scale-down need was
//! first observed:
//!
//! ```text
//!              needed < current, store ok
//!   IDLE ───────────────────────────────────► PENDING (timer = now)
//!    ▲  ▲                                        │  │
//!    │  └── needed >= current (timer deleted) ───┘  │
//!    └───── elapsed >= delay, scale down (deleted) ─┘
//! ```
//!
//! Any tick that is not a scale-down deletes the timer, so a bouncing
//! backlog restarts the delay from zero every time.
//!
//! A store held by another process is neither IDLE nor PENDING: the tick
//! cannot tell how long the need has held, so it defers the scale-down and
//! leaves the timer alone.
//!
//! The timer is not keyed by the target count. If `needed` moves while a
//! scale-down is pending, time already served still counts toward the
//! newest target.

use std::time::Duration;

use crate::decision::{Note, ScaleAction};

/// What the timer store held at the start of a scale-down tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerView {
    /// The store could not be acquired or read.
    Unavailable,
    /// The store exists but another process holds it.
    Busy,
    /// No scale-down pending.
    Idle,
    /// Scale-down pending since `started_at` (epoch seconds).
    Pending { started_at: f64 },
    /// A value is stored but is not a timestamp.
    Corrupt(String),
}

impl TimerView {
    /// Interpret a raw stored value. An empty string counts as no timer.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None => Self::Idle,
            Some(raw) if raw.is_empty() => Self::Idle,
            Some(raw) => match parse_timestamp(raw) {
                Some(started_at) => Self::Pending { started_at },
                None => Self::Corrupt(raw.to_string()),
            },
        }
    }
}

/// The single timer write a tick performs, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Leave,
    /// Write the current time.
    Start,
    Clear,
}

/// Everything a tick decided, before any side effect runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub action: ScaleAction,
    pub timer: TimerOp,
    /// Desired count to push to the capacity target.
    pub apply: Option<u32>,
}

/// Decide this tick's transition.
///
/// `read_timer` is called only when `needed < current`, and at most once.
pub fn plan<F>(current: u32, needed: u32, now: f64, delay: Duration, read_timer: F) -> Plan
where
    F: FnOnce() -> TimerView,
{
    if needed == current {
        return Plan {
            action: ScaleAction::NoChange { workers: current },
            timer: TimerOp::Clear,
            apply: None,
        };
    }

    if needed > current {
        return Plan {
            action: ScaleAction::ScaleUp {
                from: current,
                to: needed,
            },
            timer: TimerOp::Clear,
            apply: Some(needed),
        };
    }

    match read_timer() {
        TimerView::Unavailable => Plan {
            action: ScaleAction::ScaleDown {
                from: current,
                to: needed,
                note: Some(Note::StoreUnavailable),
            },
            timer: TimerOp::Leave,
            apply: Some(needed),
        },
        TimerView::Busy => Plan {
            action: ScaleAction::ScaleDownDeferred {
                from: current,
                to: needed,
            },
            timer: TimerOp::Leave,
            apply: None,
        },
        TimerView::Idle => Plan {
            action: ScaleAction::ScaleDownDelayed {
                workers: current,
                target: needed,
            },
            timer: TimerOp::Start,
            apply: None,
        },
        TimerView::Corrupt(_) => Plan {
            action: ScaleAction::ScaleDownTimerReset { workers: current },
            timer: TimerOp::Start,
            apply: None,
        },
        TimerView::Pending { started_at } => {
            let elapsed = now - started_at;
            let delay = delay.as_secs_f64();
            if elapsed >= delay {
                Plan {
                    action: ScaleAction::ScaleDown {
                        from: current,
                        to: needed,
                        note: None,
                    },
                    timer: TimerOp::Clear,
                    apply: Some(needed),
                }
            } else {
                Plan {
                    action: ScaleAction::ScaleDownWaiting {
                        from: current,
                        to: needed,
                        remaining: delay - elapsed,
                    },
                    timer: TimerOp::Leave,
                    apply: None,
                }
            }
        }
    }
}

/// Render epoch seconds the way the timer has always been stored.
pub fn format_timestamp(secs: f64) -> String {
    format!("{secs:.6}")
}

/// Parse a stored timestamp. Non-finite values are rejected.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(900);
    const NOW: f64 = 1_700_000_000.0;

    fn unread() -> TimerView {
        panic!("timer must not be read when not scaling down")
    }

    #[test]
    fn equal_counts_clear_timer_without_reading() {
        let p = plan(3, 3, NOW, DELAY, unread);
        assert_eq!(p.action, ScaleAction::NoChange { workers: 3 });
        assert_eq!(p.timer, TimerOp::Clear);
        assert_eq!(p.apply, None);
    }

    #[test]
    fn scale_up_is_immediate() {
        let p = plan(1, 2, NOW, DELAY, unread);
        assert_eq!(p.action, ScaleAction::ScaleUp { from: 1, to: 2 });
        assert_eq!(p.timer, TimerOp::Clear);
        assert_eq!(p.apply, Some(2));
    }

    #[test]
    fn first_scale_down_starts_timer() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Idle);
        assert_eq!(
            p.action,
            ScaleAction::ScaleDownDelayed {
                workers: 3,
                target: 1
            }
        );
        assert_eq!(p.timer, TimerOp::Start);
        assert_eq!(p.apply, None);
    }

    #[test]
    fn pending_scale_down_reports_remaining() {
        let p = plan(5, 1, NOW, DELAY, || TimerView::Pending {
            started_at: NOW - 400.0,
        });
        assert_eq!(
            p.action,
            ScaleAction::ScaleDownWaiting {
                from: 5,
                to: 1,
                remaining: 500.0
            }
        );
        assert_eq!(p.timer, TimerOp::Leave);
        assert_eq!(p.apply, None);
    }

    #[test]
    fn served_delay_executes_scale_down() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Pending {
            started_at: NOW - 901.0,
        });
        assert_eq!(
            p.action,
            ScaleAction::ScaleDown {
                from: 3,
                to: 1,
                note: None
            }
        );
        assert_eq!(p.timer, TimerOp::Clear);
        assert_eq!(p.apply, Some(1));
    }

    #[test]
    fn delay_boundary_is_inclusive() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Pending {
            started_at: NOW - 900.0,
        });
        assert_eq!(p.apply, Some(1));
    }

    #[test]
    fn unavailable_store_scales_down_now() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Unavailable);
        assert_eq!(
            p.action,
            ScaleAction::ScaleDown {
                from: 3,
                to: 1,
                note: Some(Note::StoreUnavailable)
            }
        );
        assert_eq!(p.timer, TimerOp::Leave);
        assert_eq!(p.apply, Some(1));
    }

    #[test]
    fn busy_store_defers_scale_down() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Busy);
        assert_eq!(p.action, ScaleAction::ScaleDownDeferred { from: 3, to: 1 });
        assert_eq!(p.timer, TimerOp::Leave);
        assert_eq!(p.apply, None);
    }

    #[test]
    fn corrupt_timer_is_reset() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Corrupt("abc".to_string()));
        assert_eq!(p.action, ScaleAction::ScaleDownTimerReset { workers: 3 });
        assert_eq!(p.timer, TimerOp::Start);
        assert_eq!(p.apply, None);
    }

    #[test]
    fn zero_delay_still_waits_one_tick() {
        let first = plan(3, 1, NOW, Duration::ZERO, || TimerView::Idle);
        assert_eq!(first.timer, TimerOp::Start);

        let second = plan(3, 1, NOW, Duration::ZERO, || TimerView::Pending {
            started_at: NOW,
        });
        assert_eq!(second.apply, Some(1));
    }

    #[test]
    fn future_timestamp_keeps_waiting() {
        let p = plan(3, 1, NOW, DELAY, || TimerView::Pending {
            started_at: NOW + 60.0,
        });
        assert_eq!(p.action.remaining(), Some(960.0));
    }

    #[test]
    fn remaining_decreases_with_time() {
        let started_at = NOW;
        let mut last = f64::INFINITY;
        for offset in [0.0, 1.0, 120.0, 450.5, 899.0] {
            let p = plan(4, 1, NOW + offset, DELAY, || TimerView::Pending { started_at });
            let remaining = p.action.remaining().unwrap();
            assert!(remaining < last);
            assert!(remaining > 0.0);
            last = remaining;
        }
    }

    #[test]
    fn stored_values_are_classified() {
        assert_eq!(TimerView::from_stored(None), TimerView::Idle);
        assert_eq!(TimerView::from_stored(Some("")), TimerView::Idle);
        assert_eq!(
            TimerView::from_stored(Some("1700000000.250000")),
            TimerView::Pending {
                started_at: 1_700_000_000.25
            }
        );
        assert_eq!(
            TimerView::from_stored(Some("not-a-time")),
            TimerView::Corrupt("not-a-time".to_string())
        );
        assert_eq!(
            TimerView::from_stored(Some("NaN")),
            TimerView::Corrupt("NaN".to_string())
        );
    }

    #[test]
    fn timestamp_format_parses_back() {
        let rendered = format_timestamp(1_700_000_000.5);
        assert_eq!(rendered, "1700000000.500000");
        assert_eq!(parse_timestamp(&rendered), Some(1_700_000_000.5));
        assert_eq!(parse_timestamp(" 42 "), Some(42.0));
        assert_eq!(parse_timestamp("inf"), None);
    }
}
