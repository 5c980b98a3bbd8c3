use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HeraldError;

/// Schedule applied when a rule is created without one: every ten minutes.
pub const DEFAULT_SCHEDULE: &str = "0 */10 * * * *";

/// Stable identifier of a rule record, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| HeraldError::InvalidRuleId(s.to_string()))
    }
}

/// Durable description of one user-defined notification condition.
///
/// `source`, `request` and `entry_point` never change after creation; a new
/// request always produces a new record. Counters and `last_executed_at` are
/// written by the scheduler only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: RuleId,
    /// Opaque token identifying the requester; notifications are addressed to it.
    pub owner: String,
    /// Natural-language request the source was generated from.
    pub request: String,
    /// Generated rule source.
    pub source: String,
    /// Name of the single public type the source declares.
    pub entry_point: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Cron expression (6-field, seconds first).
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub notification_count: u64,
}

fn default_active() -> bool {
    true
}

impl RuleRecord {
    /// Build a fresh, active record. `schedule` falls back to [`DEFAULT_SCHEDULE`].
    pub fn new(
        owner: impl Into<String>,
        request: impl Into<String>,
        source: impl Into<String>,
        entry_point: impl Into<String>,
        schedule: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let schedule = schedule
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());

        Self {
            id: RuleId::new(),
            owner: owner.into(),
            request: request.into(),
            source: source.into(),
            entry_point: entry_point.into(),
            active: true,
            schedule,
            created_at: now,
            updated_at: now,
            last_executed_at: None,
            execution_count: 0,
            notification_count: 0,
        }
    }

    /// Mark the rule inactive. Returns `false` if it already was.
    pub fn deactivate(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.updated_at = Utc::now();
        true
    }

    /// Count one scheduler evaluation at `at`.
    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_executed_at = Some(at);
        self.updated_at = at;
    }

    /// Count one positive evaluation.
    pub fn record_notification(&mut self) {
        self.notification_count += 1;
        self.updated_at = Utc::now();
    }
}
