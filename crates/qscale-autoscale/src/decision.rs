//! The decision record returned by every tick.
//!
//! Serializes flat, with the action name as a tag:
//!
//! ```json
//! {"queue":150,"needed":2,"action":"scale_up","from":1,"to":2,"mutation":{"status":"applied"}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Queue depth used for this tick (0 if the read failed).
    pub queue: u32,
    /// Worker count the calculator asked for.
    pub needed: u32,
    #[serde(flatten)]
    pub action: ScaleAction,
    /// Present only when the tick tried to change capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<MutationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScaleAction {
    NoChange {
        workers: u32,
    },
    ScaleUp {
        from: u32,
        to: u32,
    },
    /// A scale-down need was seen for the first time; the timer started.
    ScaleDownDelayed {
        workers: u32,
        target: u32,
    },
    /// Timer running, delay not yet served.
    ScaleDownWaiting {
        from: u32,
        to: u32,
        /// Seconds left until the scale-down may execute.
        remaining: f64,
    },
    ScaleDown {
        from: u32,
        to: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<Note>,
    },
    /// Stored timer was unreadable and has been restarted.
    ScaleDownTimerReset {
        workers: u32,
    },
    /// Another process held the timer store; nothing was changed.
    ScaleDownDeferred {
        from: u32,
        to: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Note {
    /// The timer store could not be used, so the delay was skipped.
    StoreUnavailable,
}

/// What happened to the capacity change a tick decided on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    DryRun,
    /// The decision stands; the next tick sees the old count and retries.
    Failed { error: String },
}

impl ScaleAction {
    /// All action names, in a stable order.
    pub const NAMES: [&'static str; 7] = [
        "no_change",
        "scale_up",
        "scale_down_delayed",
        "scale_down_waiting",
        "scale_down",
        "scale_down_timer_reset",
        "scale_down_deferred",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoChange { .. } => "no_change",
            Self::ScaleUp { .. } => "scale_up",
            Self::ScaleDownDelayed { .. } => "scale_down_delayed",
            Self::ScaleDownWaiting { .. } => "scale_down_waiting",
            Self::ScaleDown { .. } => "scale_down",
            Self::ScaleDownTimerReset { .. } => "scale_down_timer_reset",
            Self::ScaleDownDeferred { .. } => "scale_down_deferred",
        }
    }

    /// Worker count observed at the start of the tick.
    pub fn current(&self) -> u32 {
        match *self {
            Self::NoChange { workers }
            | Self::ScaleDownDelayed { workers, .. }
            | Self::ScaleDownTimerReset { workers } => workers,
            Self::ScaleUp { from, .. }
            | Self::ScaleDownWaiting { from, .. }
            | Self::ScaleDown { from, .. }
            | Self::ScaleDownDeferred { from, .. } => from,
        }
    }

    /// Seconds left on a pending scale-down, if one is waiting.
    pub fn remaining(&self) -> Option<f64> {
        match *self {
            Self::ScaleDownWaiting { remaining, .. } => Some(remaining),
            _ => None,
        }
    }
}

impl Decision {
    pub fn action_name(&self) -> &'static str {
        self.action.name()
    }

    pub fn mutation_failed(&self) -> bool {
        matches!(self.mutation, Some(MutationOutcome::Failed { .. }))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} queue={}", self.action.name(), self.queue)?;
        match &self.action {
            ScaleAction::NoChange { workers } => write!(f, " workers={workers}")?,
            ScaleAction::ScaleUp { from, to } => write!(f, " from={from} to={to}")?,
            ScaleAction::ScaleDownDelayed { workers, target } => {
                write!(f, " workers={workers} target={target}")?
            }
            ScaleAction::ScaleDownWaiting { from, to, remaining } => {
                write!(f, " from={from} to={to} remaining={remaining:.0}s")?
            }
            ScaleAction::ScaleDown { from, to, note } => {
                write!(f, " from={from} to={to}")?;
                if let Some(Note::StoreUnavailable) = note {
                    write!(f, " note=store_unavailable")?;
                }
            }
            ScaleAction::ScaleDownTimerReset { workers } => write!(f, " workers={workers}")?,
            ScaleAction::ScaleDownDeferred { from, to } => {
                write!(f, " from={from} to={to} note=store_busy")?
            }
        }
        match &self.mutation {
            Some(MutationOutcome::Applied) => write!(f, " mutation=applied"),
            Some(MutationOutcome::DryRun) => write!(f, " mutation=dry_run"),
            Some(MutationOutcome::Failed { error }) => write!(f, " mutation=failed ({error})"),
            None => Ok(()),
        }
    }
}
