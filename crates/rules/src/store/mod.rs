//! [`RuleStore`](crate::ports::RuleStore) implementations.

mod file;
mod memory;

pub use file::FileRuleStore;
pub use memory::MemoryRuleStore;

use herald_core::RuleRecord;

/// Creation order, oldest first; id breaks ties.
fn sort_records(records: &mut [RuleRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
