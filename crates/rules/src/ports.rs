//! Collaborators the engine consumes but does not implement.
//!
//! Generation, persistence, notification delivery and external data all sit
//! behind these traits so the engine can run against in-memory doubles in
//! tests and against real services in the server.

use async_trait::async_trait;
use herald_core::{NotificationContext, RuleId, RuleRecord};

use crate::error::Result;

/// Turns a natural-language request into rule source.
#[async_trait]
pub trait SourceGenerator: Send + Sync {
    async fn generate(&self, request: &str) -> Result<String>;
}

/// Atomic in-place update applied by [`RuleStore::modify`].
pub type RecordMutation = Box<dyn FnOnce(&mut RuleRecord) + Send>;

/// Durable rule records.
///
/// Listings are ordered by creation time, oldest first.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Insert or fully replace a record.
    async fn save(&self, record: &RuleRecord) -> Result<()>;

    async fn find_by_id(&self, id: RuleId) -> Result<Option<RuleRecord>>;

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>>;

    async fn find_active(&self) -> Result<Vec<RuleRecord>>;

    async fn find_active_by_owner(&self, owner: &str) -> Result<Vec<RuleRecord>>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: RuleId) -> Result<bool>;

    /// Read-modify-write one record without interleaving with other
    /// writers. Returns the updated record, or `None` if it does not exist.
    async fn modify(&self, id: RuleId, mutation: RecordMutation) -> Result<Option<RuleRecord>>;
}

/// Delivers a notification message to an owner. Fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, owner: &str, message: &str) -> Result<()>;
}

/// Produces the context snapshot for one tick.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<NotificationContext>;
}
