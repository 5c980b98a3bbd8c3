//! [`RuleInstanceCache`]: one live instance per rule id, built at most once.
//!
//! Concurrent `get_or_load` calls for an id that is not cached share a
//! single in-flight build (a [`Shared`] future stored in the slot map), so
//! the expensive compile runs once and every waiter sees the same instance
//! or the same error. Failures are never cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use herald_core::RuleId;
use tracing::{debug, warn};

use crate::error::{Result, RuleError};
use crate::factory::RuleFactory;
use crate::rule::NotificationRule;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<dyn NotificationRule>>>>;

enum Slot {
    Ready(Arc<dyn NotificationRule>),
    /// `generation` identifies this particular build so a result that lost a
    /// race with `put` or `invalidate` is not written back.
    Loading { generation: u64, load: SharedLoad },
}

/// Process-wide map of rule id to loaded instance.
///
/// No expiry and no size bound: entries leave only through
/// [`invalidate`](Self::invalidate) or when the cache is dropped.
pub struct RuleInstanceCache {
    factory: Arc<dyn RuleFactory>,
    slots: Mutex<HashMap<RuleId, Slot>>,
    generations: AtomicU64,
}

impl RuleInstanceCache {
    pub fn new(factory: Arc<dyn RuleFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RuleId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached instance for `id`, building it from `source` if needed.
    pub async fn get_or_load(&self, id: RuleId, source: &str) -> Result<Arc<dyn NotificationRule>> {
        let (generation, load) = {
            let mut slots = self.slots();
            match slots.get(&id) {
                Some(Slot::Ready(rule)) => return Ok(Arc::clone(rule)),
                Some(Slot::Loading { generation, load }) => (*generation, load.clone()),
                None => {
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    let load = self.start_load(id, source.to_string());
                    slots.insert(
                        id,
                        Slot::Loading {
                            generation,
                            load: load.clone(),
                        },
                    );
                    (generation, load)
                }
            }
        };

        let result = load.await;
        self.settle(id, generation, &result);
        result
    }

    fn start_load(&self, id: RuleId, source: String) -> SharedLoad {
        let factory = Arc::clone(&self.factory);
        async move {
            let started = Instant::now();
            let result = tokio::task::spawn_blocking(move || factory.build(&source))
                .await
                .map_err(|e| RuleError::Internal(format!("rule load task failed: {e}")))
                .and_then(|built| built);

            match &result {
                Ok(rule) => debug!(
                    rule_id = %id,
                    entry_point = %rule.entry_point(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "rule instance loaded"
                ),
                Err(e) => warn!(
                    rule_id = %id,
                    stage = %e.stage(),
                    error = %e,
                    "rule instance load failed"
                ),
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Publish a finished build if its slot still belongs to it.
    fn settle(&self, id: RuleId, generation: u64, result: &Result<Arc<dyn NotificationRule>>) {
        let mut slots = self.slots();
        let current = matches!(
            slots.get(&id),
            Some(Slot::Loading { generation: g, .. }) if *g == generation
        );
        if !current {
            return;
        }
        match result {
            Ok(rule) => {
                slots.insert(id, Slot::Ready(Arc::clone(rule)));
            }
            Err(_) => {
                slots.remove(&id);
            }
        }
    }

    /// Install an already-built instance, replacing anything cached.
    pub fn put(&self, id: RuleId, rule: Arc<dyn NotificationRule>) {
        self.slots().insert(id, Slot::Ready(rule));
    }

    /// Drop the cached or in-flight entry for `id`. Returns whether one existed.
    pub fn invalidate(&self, id: RuleId) -> bool {
        self.slots().remove(&id).is_some()
    }

    /// Whether a ready instance is cached for `id`.
    pub fn contains(&self, id: RuleId) -> bool {
        matches!(self.slots().get(&id), Some(Slot::Ready(_)))
    }

    /// Number of ready instances.
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
