use std::sync::Arc;

use herald_rules::{RuleExecutionScheduler, RuleService};

/// Shared by every request handler.
pub struct AppState {
    pub service: RuleService,
    pub scheduler: Arc<RuleExecutionScheduler>,
    /// Whether rules can be created (an LLM provider is configured).
    pub generator_ready: bool,
    /// Compiler version string, reported by `/health`.
    pub toolchain: String,
    /// Redacted config for `/api/config`.
    pub config_summary: serde_json::Value,
}
