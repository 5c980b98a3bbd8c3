//! Compiling rule source into loadable units.
//!
//! Every compile gets its own [`BuildWorkspace`] holding the rule source,
//! the contract prelude and a generated crate root. `rustc` builds a
//! `cdylib` there; the library is then copied next to the other artifacts
//! so the workspace can be removed immediately.

mod diagnostics;
pub mod glue;
mod toolchain;
mod workspace;

use std::env::consts::DLL_SUFFIX;
use std::fs;
use std::path::Path;
use std::time::Instant;

use herald_core::config::EngineConfig;
use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::{Diagnostic, Result, RuleError};

pub use glue::RULE_NAMESPACE;
pub use toolchain::Toolchain;
pub use workspace::PRELUDE_SOURCE;

use workspace::{source_file_name, BuildWorkspace};

/// Output of a successful compile: a loadable library plus its identity.
///
/// The library file is removed when the artifact is dropped.
#[derive(Debug)]
pub struct Artifact {
    library: TempPath,
    entry_point: String,
    qualified_name: String,
}

impl Artifact {
    pub fn library_path(&self) -> &Path {
        &self.library
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Entry point inside the rule namespace, e.g. `rules::ColdWeatherRule`.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }
}

/// Turns rule source into [`Artifact`]s with the detected toolchain.
pub struct CompilationEngine {
    toolchain: Toolchain,
    config: EngineConfig,
}

impl CompilationEngine {
    /// Detect the toolchain and prepare the artifact directory.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let toolchain = Toolchain::detect(&config.rustc)?;
        fs::create_dir_all(&config.artifact_dir).map_err(|e| {
            RuleError::Workspace(format!(
                "cannot create artifact dir {}: {e}",
                config.artifact_dir.display()
            ))
        })?;
        info!(
            artifact_dir = %config.artifact_dir.display(),
            opt_level = %config.opt_level,
            "rule compilation engine ready"
        );
        Ok(Self { toolchain, config })
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Compile `source`, whose public type is `entry_point`, into a library.
    ///
    /// Blocking: runs the compiler to completion.
    pub fn compile(&self, source: &str, entry_point: &str) -> Result<Artifact> {
        if !is_identifier(entry_point) {
            return Err(RuleError::InvalidRequest(format!(
                "'{entry_point}' is not a valid type name"
            )));
        }

        let started = Instant::now();
        let workspace = BuildWorkspace::create(self.config.workspace_root.as_deref())?;
        let crate_root = workspace.write_sources(entry_point, source)?;
        let built = workspace.path().join(format!("herald_rule{DLL_SUFFIX}"));

        let output = self
            .toolchain
            .command()
            .current_dir(workspace.path())
            .args(["--edition", "2021", "--crate-type", "cdylib"])
            .arg("--crate-name")
            .arg(crate_name(entry_point))
            .args(["--error-format", "json"])
            .arg("-C")
            .arg(format!("opt-level={}", self.config.opt_level))
            .arg("-o")
            .arg(&built)
            .args(&self.config.extra_args)
            .arg(&crate_root)
            .output()
            .map_err(|e| {
                RuleError::ToolchainUnavailable(format!(
                    "cannot run '{}': {e}",
                    self.toolchain.rustc()
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut errors = diagnostics::parse(&stderr, &source_file_name(entry_point));

        if !output.status.success() || !errors.is_empty() {
            if errors.is_empty() {
                errors.push(diagnostics::fallback(&stderr, &output.status.to_string()));
            }
            debug!(
                entry_point = %entry_point,
                errors = errors.len(),
                "rule compilation failed"
            );
            return Err(RuleError::Compile {
                entry_point: entry_point.to_string(),
                diagnostics: errors,
            });
        }

        if !built.exists() {
            return Err(RuleError::Compile {
                entry_point: entry_point.to_string(),
                diagnostics: vec![Diagnostic {
                    line: 0,
                    message: "compiler reported success but produced no library".to_string(),
                }],
            });
        }

        let library = self.persist(&built)?;

        debug!(
            entry_point = %entry_point,
            library = %library.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rule unit compiled"
        );

        Ok(Artifact {
            library,
            entry_point: entry_point.to_string(),
            qualified_name: format!("{RULE_NAMESPACE}::{entry_point}"),
        })
    }

    /// Copy the built library out of the workspace under a unique name.
    fn persist(&self, built: &Path) -> Result<TempPath> {
        let library = tempfile::Builder::new()
            .prefix("herald-rule-")
            .suffix(DLL_SUFFIX)
            .tempfile_in(&self.config.artifact_dir)
            .map_err(|e| RuleError::Workspace(format!("cannot allocate artifact: {e}")))?
            .into_temp_path();
        fs::copy(built, &library)
            .map_err(|e| RuleError::Workspace(format!("cannot store artifact: {e}")))?;
        Ok(library)
    }
}

fn crate_name(entry_point: &str) -> String {
    format!("herald_rule_{}", entry_point.to_ascii_lowercase())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("ColdWeatherRule"));
        assert!(is_identifier("_Rule2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2Rule"));
        assert!(!is_identifier("../evil"));
    }

    #[test]
    fn crate_names_are_snake_case() {
        assert_eq!(crate_name("ColdWeatherRule"), "herald_rule_coldweatherrule");
    }

    #[test]
    fn unavailable_toolchain_fails_construction() {
        let config = EngineConfig {
            rustc: "/nonexistent/herald-rustc".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            CompilationEngine::new(config),
            Err(RuleError::ToolchainUnavailable(_))
        ));
    }
}
