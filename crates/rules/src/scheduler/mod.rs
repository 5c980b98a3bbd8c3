//! Recurring rule evaluation.
//!
//! One timer drives ticks; each tick fetches a single context snapshot and
//! evaluates every active, due rule against it. Per-rule cron expressions
//! decide which rules are due on a given tick.

mod core;
mod cron;
mod report;
mod tests;

pub use self::core::RuleExecutionScheduler;
pub use self::cron::{parse_schedule, validate_schedule};
pub use self::report::{RuleFailure, TickReport};
