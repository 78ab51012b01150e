//! redb table definitions for the qscale timer store.

use redb::TableDefinition;

/// Timer values keyed by name (e.g. `qscale:scale_down_time`).
///
/// Values are epoch seconds rendered as decimal strings, the same encoding
/// the previous Redis-backed autoscaler used.
pub const TIMERS: TableDefinition<&str, &str> = TableDefinition::new("timers");
