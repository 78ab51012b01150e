//! Prometheus text exposition of a tick's decision.
//!
//! Written as a node-exporter textfile so the last decision can be
//! scraped even though the autoscaler is not a long-running process.

use crate::decision::{Decision, ScaleAction};

/// Render one decision into Prometheus text format.
pub fn render_prometheus(decision: &Decision) -> String {
    let mut out = String::new();

    out.push_str("# HELP qscale_queue_size Ready messages observed this tick.\n");
    out.push_str("# TYPE qscale_queue_size gauge\n");
    out.push_str(&format!("qscale_queue_size {}\n", decision.queue));

    out.push_str("# HELP qscale_current_workers Desired count reported by the capacity target.\n");
    out.push_str("# TYPE qscale_current_workers gauge\n");
    out.push_str(&format!(
        "qscale_current_workers {}\n",
        decision.action.current()
    ));

    out.push_str("# HELP qscale_needed_workers Worker count computed from the queue.\n");
    out.push_str("# TYPE qscale_needed_workers gauge\n");
    out.push_str(&format!("qscale_needed_workers {}\n", decision.needed));

    out.push_str(
        "# HELP qscale_scale_down_remaining_seconds Seconds until a pending scale-down may run.\n",
    );
    out.push_str("# TYPE qscale_scale_down_remaining_seconds gauge\n");
    out.push_str(&format!(
        "qscale_scale_down_remaining_seconds {:.0}\n",
        decision.action.remaining().unwrap_or(0.0).max(0.0)
    ));

    out.push_str("# HELP qscale_decision Action taken on the last tick (1 = taken).\n");
    out.push_str("# TYPE qscale_decision gauge\n");
    let taken = decision.action.name();
    for name in ScaleAction::NAMES {
        out.push_str(&format!(
            "qscale_decision{{action=\"{name}\"}} {}\n",
            u8::from(name == taken)
        ));
    }

    out.push_str("# HELP qscale_store_unavailable Whether the tick ran without its timer store.\n");
    out.push_str("# TYPE qscale_store_unavailable gauge\n");
    let degraded = matches!(decision.action, ScaleAction::ScaleDown { note: Some(_), .. });
    out.push_str(&format!("qscale_store_unavailable {}\n", u8::from(degraded)));

    out.push_str("# HELP qscale_mutation_failed Whether the capacity change failed to apply.\n");
    out.push_str("# TYPE qscale_mutation_failed gauge\n");
    out.push_str(&format!(
        "qscale_mutation_failed {}\n",
        u8::from(decision.mutation_failed())
    ));

    out
}
