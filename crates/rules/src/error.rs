//! Error types shared by every stage of the rule pipeline.

use std::fmt;

use herald_core::RuleId;
use serde::Serialize;

/// One error-level compiler message, positioned against the rule source.
///
/// `line` is 1-based and refers to the user's source file. Messages that
/// originate in generated glue rather than the source carry line 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// Pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Inspect,
    Compile,
    Load,
    Store,
    Fetch,
    Evaluate,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Inspect => "inspect",
            Stage::Compile => "compile",
            Stage::Load => "load",
            Stage::Store => "store",
            Stage::Fetch => "fetch",
            Stage::Evaluate => "evaluate",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

/// Errors produced while creating, compiling, loading, storing or running rules.
///
/// `Clone` so a single failed in-flight load can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleError {
    /// The source generator failed or returned nothing usable.
    #[error("Code generation failed: {0}")]
    Generation(String),

    /// The source declares no public top-level type.
    #[error("No public top-level struct declaration found in rule source")]
    EntryPointNotFound,

    /// The compiler rejected the source.
    #[error("Compilation of `{entry_point}` failed: {}", join_diagnostics(.diagnostics))]
    Compile {
        entry_point: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// The compiler executable could not be run at all.
    #[error("Rule toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    /// The temporary build workspace could not be prepared.
    #[error("Build workspace error: {0}")]
    Workspace(String),

    /// The compiled artifact could not be opened.
    #[error("Failed to load rule unit: {0}")]
    Load(String),

    /// The compiled unit does not honour the rule ABI.
    #[error("Rule contract violation: {0}")]
    ContractViolation(String),

    /// Constructing the entry-point type failed inside the unit.
    #[error("Rule instantiation failed: {0}")]
    Instantiation(String),

    #[error("Context fetch failed: {0}")]
    Fetch(String),

    #[error("Rule store error: {0}")]
    Store(String),

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("Rule {0} not found")]
    NotFound(RuleId),

    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// A loaded rule faulted while evaluating or describing.
    #[error("Rule evaluation failed: {0}")]
    Evaluation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "no diagnostics reported".to_string();
    }
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RuleError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            RuleError::Generation(_) => Stage::Generate,
            RuleError::EntryPointNotFound
            | RuleError::InvalidSchedule { .. }
            | RuleError::InvalidRequest(_) => Stage::Inspect,
            RuleError::Compile { .. }
            | RuleError::ToolchainUnavailable(_)
            | RuleError::Workspace(_) => Stage::Compile,
            RuleError::Load(_)
            | RuleError::ContractViolation(_)
            | RuleError::Instantiation(_) => Stage::Load,
            RuleError::Store(_) | RuleError::NotFound(_) | RuleError::Internal(_) => Stage::Store,
            RuleError::Fetch(_) => Stage::Fetch,
            RuleError::Evaluation(_) => Stage::Evaluate,
            RuleError::Dispatch(_) => Stage::Dispatch,
        }
    }

    /// Compiler diagnostics, empty for every other variant.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            RuleError::Compile { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for RuleError {
    fn from(e: std::io::Error) -> Self {
        RuleError::Internal(e.to_string())
    }
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
