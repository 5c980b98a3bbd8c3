//! Process-local rule store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use herald_core::{RuleId, RuleRecord};

use super::sort_records;
use crate::error::Result;
use crate::ports::{RecordMutation, RuleStore};

/// Rule records held in a `RwLock`ed map. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    records: RwLock<HashMap<RuleId, RuleRecord>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, predicate: impl Fn(&RuleRecord) -> bool) -> Vec<RuleRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut selected: Vec<RuleRecord> =
            records.values().filter(|r| predicate(r)).cloned().collect();
        sort_records(&mut selected);
        selected
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn save(&self, record: &RuleRecord) -> Result<()> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RuleId) -> Result<Option<RuleRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        Ok(self.select(|r| r.owner == owner))
    }

    async fn find_active(&self) -> Result<Vec<RuleRecord>> {
        Ok(self.select(|r| r.active))
    }

    async fn find_active_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>> {
        Ok(self.select(|r| r.active && r.owner == owner))
    }

    async fn delete(&self, id: RuleId) -> Result<bool> {
        Ok(self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some())
    }

    async fn modify(&self, id: RuleId, mutation: RecordMutation) -> Result<Option<RuleRecord>> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get_mut(&id).map(|record| {
            mutation(record);
            record.clone()
        }))
    }
}
