//! Per-tick outcome summary.

use chrono::{DateTime, Utc};
use herald_core::RuleId;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{RuleError, Stage};

/// A rule that could not be resolved or that faulted during a tick.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub rule_id: RuleId,
    pub stage: Stage,
    pub error: String,
}

impl RuleFailure {
    pub(crate) fn new(rule_id: RuleId, error: &RuleError) -> Self {
        Self {
            rule_id,
            stage: error.stage(),
            error: error.to_string(),
        }
    }
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the tick stopped before evaluating anything.
    pub aborted: Option<String>,
    /// Active rules listed at the start of the tick.
    pub active: usize,
    /// Active rules whose schedule was not due.
    pub skipped: usize,
    /// Due rules passed over because a previous call into the same instance
    /// (one that timed out) has not returned yet.
    pub busy: usize,
    /// Rules whose `evaluate` was called (including faulted ones).
    pub evaluated: usize,
    pub notified: usize,
    /// Rules that could not be compiled or loaded; never evaluated.
    pub failures: Vec<RuleFailure>,
    /// Rules that faulted while evaluating or describing.
    pub faults: Vec<RuleFailure>,
    pub dispatch_failures: usize,
    pub persist_failures: usize,
}

impl TickReport {
    pub(crate) fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            aborted: None,
            active: 0,
            skipped: 0,
            busy: 0,
            evaluated: 0,
            notified: 0,
            failures: Vec::new(),
            faults: Vec::new(),
            dispatch_failures: 0,
            persist_failures: 0,
        }
    }

    pub(crate) fn abort(mut self, error: &RuleError) -> Self {
        self.aborted = Some(error.to_string());
        self.finished_at = Utc::now();
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Emit the summary at `info`, or `warn` for an aborted tick.
    pub fn log(&self) {
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        match &self.aborted {
            Some(reason) => warn!(reason = %reason, elapsed_ms, "Rule tick aborted"),
            None => info!(
                active = self.active,
                skipped = self.skipped,
                busy = self.busy,
                evaluated = self.evaluated,
                notified = self.notified,
                failures = self.failures.len(),
                faults = self.faults.len(),
                elapsed_ms,
                "Rule tick complete"
            ),
        }
    }
}
