//! [`RuleExecutionScheduler`]: fetch one context, evaluate every due rule.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use herald_core::config::SchedulerConfig;
use herald_core::{NotificationContext, RuleId, RuleRecord};
use tokio::sync::{Mutex, Notify};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::cron::{is_cron_due, parse_schedule};
use super::report::{RuleFailure, TickReport};
use crate::cache::RuleInstanceCache;
use crate::error::{Result, RuleError};
use crate::ports::{ContextSource, NotificationSink, RuleStore};
use crate::rule::NotificationRule;

/// Result of running one rule within a tick.
enum RuleOutcome {
    /// The instance could not be resolved; nothing was evaluated or counted.
    Unavailable(RuleFailure),
    /// An earlier call into the instance is still running.
    Busy,
    Ran {
        notified: bool,
        fault: Option<RuleFailure>,
        dispatch_failed: bool,
        persist_failed: bool,
    },
}

/// Drives the `fetch context -> evaluate all` cycle.
///
/// Ticks are serialized by an internal lock, so a manual
/// [`run_tick`](Self::run_tick) never overlaps the timer-driven loop and a
/// rule is never evaluated twice concurrently. A call that outlives the
/// evaluation timeout keeps its rule marked in flight until it returns, and
/// later ticks pass the rule over until then.
pub struct RuleExecutionScheduler {
    config: SchedulerConfig,
    store: Arc<dyn RuleStore>,
    cache: Arc<RuleInstanceCache>,
    source: Arc<dyn ContextSource>,
    sink: Arc<dyn NotificationSink>,
    tick_lock: Mutex<()>,
    in_flight: Arc<StdMutex<HashSet<RuleId>>>,
    shutdown: Notify,
}

/// Marks a rule as having a call in progress; cleared on drop.
///
/// Shared between the tick and the blocking closures, so the mark outlives
/// a timed-out call until the closure itself finishes.
struct InFlight {
    id: RuleId,
    ids: Arc<StdMutex<HashSet<RuleId>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl RuleExecutionScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn RuleStore>,
        cache: Arc<RuleInstanceCache>,
        source: Arc<dyn ContextSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            source,
            sink,
            tick_lock: Mutex::new(()),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            shutdown: Notify::new(),
        }
    }

    /// Tick every `tick_secs` until [`shutdown`](Self::shutdown) is called.
    ///
    /// The first tick fires immediately. A tick that overruns delays the
    /// next one instead of bunching ticks up.
    pub async fn run(&self) {
        let period = Duration::from_secs(self.config.tick_secs.max(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_secs = period.as_secs(),
            max_concurrency = self.config.max_concurrency,
            honor_rule_schedules = self.config.honor_rule_schedules,
            "Rule scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_tick().await;
                }
                _ = self.shutdown.notified() => {
                    info!("Rule scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Stop [`run`](Self::run) after the current tick, if any.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run one complete tick now.
    pub async fn run_tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let report = self.tick().await;
        report.log();
        report
    }

    async fn tick(&self) -> TickReport {
        let mut report = TickReport::begin(Utc::now());

        let context = match self.fetch_context().await {
            Ok(context) => Arc::new(context),
            Err(e) => return report.abort(&e),
        };
        let records = match self.store.find_active().await {
            Ok(records) => records,
            Err(e) => return report.abort(&e),
        };
        report.active = records.len();

        let now = Utc::now();
        let due: Vec<RuleRecord> = records
            .into_iter()
            .filter(|record| self.is_due(record, now))
            .collect();
        report.skipped = report.active - due.len();

        if due.is_empty() {
            debug!("Rule tick: no rules due at {}", now);
        } else {
            debug!("Rule tick: {} rule(s) due for evaluation", due.len());
        }

        let outcomes: Vec<RuleOutcome> = stream::iter(due)
            .map(|record| self.execute(record, Arc::clone(&context), now))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RuleOutcome::Unavailable(failure) => report.failures.push(failure),
                RuleOutcome::Busy => report.busy += 1,
                RuleOutcome::Ran {
                    notified,
                    fault,
                    dispatch_failed,
                    persist_failed,
                } => {
                    report.evaluated += 1;
                    report.notified += usize::from(notified);
                    report.dispatch_failures += usize::from(dispatch_failed);
                    report.persist_failures += usize::from(persist_failed);
                    report.faults.extend(fault);
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }

    async fn fetch_context(&self) -> Result<NotificationContext> {
        let fetch = self.source.fetch_snapshot();
        if self.config.fetch_timeout_secs == 0 {
            return fetch.await;
        }
        let limit = Duration::from_secs(self.config.fetch_timeout_secs);
        time::timeout(limit, fetch)
            .await
            .map_err(|_| RuleError::Fetch(format!("timed out after {}s", limit.as_secs())))?
    }

    fn is_due(&self, record: &RuleRecord, now: DateTime<Utc>) -> bool {
        if !self.config.honor_rule_schedules {
            return true;
        }
        match parse_schedule(&record.schedule) {
            Ok(schedule) => is_cron_due(&schedule, now, record.last_executed_at),
            Err(e) => {
                warn!(
                    rule_id = %record.id,
                    cron = %record.schedule,
                    error = %e,
                    "invalid cron expression"
                );
                false
            }
        }
    }

    fn claim(&self, id: RuleId) -> Option<Arc<InFlight>> {
        let mut ids = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id) {
            return None;
        }
        Some(Arc::new(InFlight {
            id,
            ids: Arc::clone(&self.in_flight),
        }))
    }

    async fn execute(
        &self,
        record: RuleRecord,
        context: Arc<NotificationContext>,
        now: DateTime<Utc>,
    ) -> RuleOutcome {
        let id = record.id;

        let rule = match self.cache.get_or_load(id, &record.source).await {
            Ok(rule) => rule,
            Err(e) => {
                warn!(rule_id = %id, stage = %e.stage(), error = %e, "Rule skipped: instance unavailable");
                return RuleOutcome::Unavailable(RuleFailure::new(id, &e));
            }
        };

        let Some(claim) = self.claim(id) else {
            warn!(rule_id = %id, "Rule skipped: previous evaluation still running");
            return RuleOutcome::Busy;
        };

        let mut fault = None;
        let holds = match self
            .call(Arc::clone(&claim), Arc::clone(&rule), Arc::clone(&context), |r, c| r.evaluate(c))
            .await
        {
            Ok(holds) => holds,
            Err(e) => {
                warn!(rule_id = %id, error = %e, "Rule evaluation failed");
                fault = Some(RuleFailure::new(id, &e));
                false
            }
        };

        let message = if holds {
            match self.call(Arc::clone(&claim), rule, context, |r, c| r.describe(c)).await {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(rule_id = %id, error = %e, "Rule describe failed");
                    fault = Some(RuleFailure::new(id, &e));
                    None
                }
            }
        } else {
            None
        };
        let notified = message.is_some();
        drop(claim);

        let mut dispatch_failed = false;
        if let Some(message) = message {
            match self.sink.send(&record.owner, &message).await {
                Ok(()) => info!(rule_id = %id, owner = %record.owner, "Notification dispatched"),
                Err(e) => {
                    warn!(rule_id = %id, owner = %record.owner, error = %e, "Notification dispatch failed");
                    dispatch_failed = true;
                }
            }
        }

        let persisted = self
            .store
            .modify(
                id,
                Box::new(move |r| {
                    r.record_execution(now);
                    if notified {
                        r.record_notification();
                    }
                }),
            )
            .await;
        let persist_failed = match persisted {
            Ok(Some(current)) => {
                if !current.active {
                    self.evict(id, "deactivated");
                }
                false
            }
            Ok(None) => {
                debug!(rule_id = %id, "Rule record removed during tick; counters dropped");
                self.evict(id, "deleted");
                false
            }
            Err(e) => {
                warn!(rule_id = %id, error = %e, "Failed to persist rule execution");
                true
            }
        };

        RuleOutcome::Ran {
            notified,
            fault,
            dispatch_failed,
            persist_failed,
        }
    }

    /// Drop an instance the tick may have cached after the record went away.
    fn evict(&self, id: RuleId, why: &str) {
        if self.cache.invalidate(id) {
            debug!(rule_id = %id, "Evicted instance of rule {} during tick", why);
        }
    }

    /// Run a blocking call into `rule` on the blocking pool, bounded by the
    /// evaluation timeout. `claim` is held until the call returns.
    async fn call<T, F>(
        &self,
        claim: Arc<InFlight>,
        rule: Arc<dyn NotificationRule>,
        context: Arc<NotificationContext>,
        f: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn NotificationRule, &NotificationContext) -> Result<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(move || {
            let _claim = claim;
            f(rule.as_ref(), &context)
        });
        let joined = if self.config.eval_timeout_secs == 0 {
            task.await
        } else {
            let limit = Duration::from_secs(self.config.eval_timeout_secs);
            match time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(RuleError::Evaluation(format!(
                        "timed out after {}s",
                        limit.as_secs()
                    )))
                }
            }
        };
        joined.map_err(|e| RuleError::Evaluation(format!("rule task failed: {e}")))?
    }
}
