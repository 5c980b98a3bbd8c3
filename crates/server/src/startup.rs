//! Wiring: build the engine, its collaborators and the shared state.

use std::sync::Arc;

use tracing::{info, warn};

use herald_core::Config;
use herald_llm::RuleCodeGenerator;
use herald_notify::Dispatcher;
use herald_rules::ports::{ContextSource, NotificationSink, RuleStore, SourceGenerator};
use herald_rules::store::FileRuleStore;
use herald_rules::{DynamicRuleFactory, RuleExecutionScheduler, RuleFactory, RuleInstanceCache, RuleService};

use crate::bridges::{DispatcherSink, LlmSourceGenerator};
use crate::feeds::SimulatedFeed;
use crate::state::AppState;

/// Build `AppState` from config.
///
/// A missing compiler is fatal: without it no rule can ever run.
pub async fn build_app_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let factory = DynamicRuleFactory::from_config(&config.engine)?;
    let toolchain = factory.engine().toolchain().version().to_string();
    info!(toolchain = %toolchain, "Rule compiler ready");

    let factory: Arc<dyn RuleFactory> = Arc::new(factory);
    let cache = Arc::new(RuleInstanceCache::new(Arc::clone(&factory)));

    let store = FileRuleStore::open(config.storage.rules_dir.clone()).await?;
    info!(dir = %store.dir().display(), "Rule store opened");
    let store: Arc<dyn RuleStore> = Arc::new(store);

    // LLM init is config-based and fast; a missing key only disables creation.
    let generator = match RuleCodeGenerator::from_config(&config.llm, &config.ollama) {
        Ok(generator) => {
            info!(provider = generator.provider_name(), "Rule code generator ready");
            LlmSourceGenerator::new(generator)
        }
        Err(e) => {
            warn!(error = %e, "Rule code generator not available; POST /api/rules will fail");
            LlmSourceGenerator::unavailable(&e)
        }
    };
    let generator_ready = generator.is_available();
    let generator: Arc<dyn SourceGenerator> = Arc::new(generator);

    let dispatcher = Dispatcher::from_config(&config.notify)?;
    info!(channels = ?dispatcher.channel_names(), "Notification dispatcher ready");
    let sink: Arc<dyn NotificationSink> = Arc::new(DispatcherSink::new(dispatcher));
    let source: Arc<dyn ContextSource> = Arc::new(SimulatedFeed::new());

    let scheduler = Arc::new(RuleExecutionScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&store),
        Arc::clone(&cache),
        source,
        sink,
    ));
    let service = RuleService::new(generator, store, factory, cache);

    Ok(Arc::new(AppState {
        service,
        scheduler,
        generator_ready,
        toolchain,
        config_summary: config.redacted_summary(),
    }))
}
