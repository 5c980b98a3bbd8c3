//! Dynamic rule compilation and execution engine.
//!
//! This crate provides:
//! - Entry-point discovery in generated rule source
//! - Compilation of rule source into `cdylib` units with `rustc`
//! - Loading units through a small C ABI and instantiating their rule type
//! - A single-flight instance cache shared by the API and the scheduler
//! - The recurring scheduler that evaluates rules against a context snapshot
//! - Rule lifecycle management and record stores

pub mod cache;
pub mod compiler;
pub mod error;
pub mod factory;
pub mod inspect;
pub mod loader;
pub mod ports;
pub mod rule;
pub mod scheduler;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

#[cfg(test)]
#[allow(dead_code)]
#[path = "../contract/prelude.rs"]
mod contract;

pub use cache::RuleInstanceCache;
pub use compiler::{Artifact, CompilationEngine};
pub use error::{Diagnostic, Result, RuleError, Stage};
pub use factory::{DynamicRuleFactory, RuleFactory};
pub use loader::RuleLoader;
pub use rule::NotificationRule;
pub use scheduler::{RuleExecutionScheduler, TickReport};
pub use service::{CreateRule, RuleService, RuleView};
