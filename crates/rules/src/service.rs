//! Rule lifecycle: create from a request, look up, deactivate, delete.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use herald_core::{RuleId, RuleRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::RuleInstanceCache;
use crate::error::{Result, RuleError};
use crate::factory::RuleFactory;
use crate::inspect::extract_entry_point;
use crate::ports::{RuleStore, SourceGenerator};
use crate::rule::NotificationRule;
use crate::scheduler::validate_schedule;

/// Input to [`RuleService::create_rule`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRule {
    pub owner: String,
    pub request: String,
    #[serde(default)]
    pub schedule: Option<String>,
}

/// Public view of a rule record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    pub id: RuleId,
    pub owner: String,
    pub request: String,
    pub entry_point: String,
    pub source: String,
    pub active: bool,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub notification_count: u64,
}

impl From<RuleRecord> for RuleView {
    fn from(r: RuleRecord) -> Self {
        Self {
            id: r.id,
            owner: r.owner,
            request: r.request,
            entry_point: r.entry_point,
            source: r.source,
            active: r.active,
            schedule: r.schedule,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_executed_at: r.last_executed_at,
            execution_count: r.execution_count,
            notification_count: r.notification_count,
        }
    }
}

/// Creates and manages rules on behalf of owners.
///
/// Shares its [`RuleInstanceCache`] with the scheduler: a created rule is
/// cached eagerly, a deactivated or deleted one is evicted at once.
pub struct RuleService {
    generator: Arc<dyn SourceGenerator>,
    store: Arc<dyn RuleStore>,
    factory: Arc<dyn RuleFactory>,
    cache: Arc<RuleInstanceCache>,
}

impl RuleService {
    pub fn new(
        generator: Arc<dyn SourceGenerator>,
        store: Arc<dyn RuleStore>,
        factory: Arc<dyn RuleFactory>,
        cache: Arc<RuleInstanceCache>,
    ) -> Self {
        Self {
            generator,
            store,
            factory,
            cache,
        }
    }

    /// Generate, compile and persist a new rule.
    ///
    /// Any failure leaves no record behind and the cache untouched.
    pub async fn create_rule(&self, input: CreateRule) -> Result<RuleRecord> {
        let owner = input.owner.trim();
        let request = input.request.trim();
        if owner.is_empty() {
            return Err(RuleError::InvalidRequest("owner must not be empty".into()));
        }
        if request.is_empty() {
            return Err(RuleError::InvalidRequest("request must not be empty".into()));
        }
        let schedule = input
            .schedule
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(expression) = &schedule {
            validate_schedule(expression)?;
        }

        let source = self.generator.generate(request).await?;
        let entry_point = extract_entry_point(&source)?;
        debug!(owner = %owner, entry_point = %entry_point, "rule source generated");

        let factory = Arc::clone(&self.factory);
        let unit_source = source.clone();
        let instance = tokio::task::spawn_blocking(move || factory.build(&unit_source))
            .await
            .map_err(|e| RuleError::Internal(format!("rule build task failed: {e}")))??;

        if instance.entry_point() != entry_point {
            return Err(RuleError::ContractViolation(format!(
                "built `{}` but source declares `{entry_point}`",
                instance.entry_point()
            )));
        }

        let record = RuleRecord::new(owner, request, source, entry_point, schedule);
        self.store.save(&record).await?;
        self.cache.put(record.id, instance);

        info!(
            rule_id = %record.id,
            owner = %record.owner,
            entry_point = %record.entry_point,
            schedule = %record.schedule,
            "Rule created"
        );
        Ok(record)
    }

    pub async fn get_rule(&self, id: RuleId) -> Result<RuleRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(RuleError::NotFound(id))
    }

    pub async fn rules_for_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        self.store.find_by_owner(owner).await
    }

    pub async fn active_rules(&self) -> Result<Vec<RuleRecord>> {
        self.store.find_active().await
    }

    pub async fn active_rules_for_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        self.store.find_active_by_owner(owner).await
    }

    /// Stop evaluating a rule. Idempotent; the record is kept.
    pub async fn deactivate_rule(&self, id: RuleId) -> Result<RuleRecord> {
        let record = self
            .store
            .modify(
                id,
                Box::new(|r| {
                    r.deactivate();
                }),
            )
            .await?
            .ok_or(RuleError::NotFound(id))?;
        self.cache.invalidate(id);
        info!(rule_id = %id, "Rule deactivated");
        Ok(record)
    }

    pub async fn delete_rule(&self, id: RuleId) -> Result<()> {
        let existed = self.store.delete(id).await?;
        self.cache.invalidate(id);
        if !existed {
            return Err(RuleError::NotFound(id));
        }
        info!(rule_id = %id, "Rule deleted");
        Ok(())
    }

    /// The live instance for a stored rule, compiling it if not cached.
    pub async fn rule_instance(&self, id: RuleId) -> Result<Arc<dyn NotificationRule>> {
        let record = self.get_rule(id).await?;
        self.cache.get_or_load(id, &record.source).await
    }
}
