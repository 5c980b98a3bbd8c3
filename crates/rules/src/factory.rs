//! Source-to-instance construction: inspect, compile, load.

use std::sync::Arc;

use herald_core::config::EngineConfig;

use crate::compiler::CompilationEngine;
use crate::error::Result;
use crate::inspect::extract_entry_point;
use crate::loader::RuleLoader;
use crate::rule::NotificationRule;

/// Builds a live rule instance from source.
///
/// Blocking; async callers run it on the blocking pool.
pub trait RuleFactory: Send + Sync {
    fn build(&self, source: &str) -> Result<Arc<dyn NotificationRule>>;
}

/// The production factory: compiles with `rustc` and loads the unit.
pub struct DynamicRuleFactory {
    engine: CompilationEngine,
    loader: RuleLoader,
}

impl DynamicRuleFactory {
    pub fn new(engine: CompilationEngine) -> Self {
        Self {
            engine,
            loader: RuleLoader::new(),
        }
    }

    /// Detect the toolchain described by `config` and build a factory on it.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(CompilationEngine::new(config.clone())?))
    }

    pub fn engine(&self) -> &CompilationEngine {
        &self.engine
    }
}

impl RuleFactory for DynamicRuleFactory {
    fn build(&self, source: &str) -> Result<Arc<dyn NotificationRule>> {
        let entry_point = extract_entry_point(source)?;
        let artifact = self.engine.compile(source, &entry_point)?;
        // The mapped library outlives the artifact file.
        self.loader.load(&artifact)
    }
}
