//! Locating the Rust compiler used to build rule units.

use std::process::Command;

use tracing::info;

use crate::error::{Result, RuleError};

/// A compiler executable that answered `--version`.
#[derive(Debug, Clone)]
pub struct Toolchain {
    rustc: String,
    version: String,
}

impl Toolchain {
    /// Probe `rustc --version`. A compiler that cannot be spawned or exits
    /// non-zero is [`RuleError::ToolchainUnavailable`].
    pub fn detect(rustc: &str) -> Result<Self> {
        let output = Command::new(rustc)
            .arg("--version")
            .output()
            .map_err(|e| RuleError::ToolchainUnavailable(format!("cannot run '{rustc}': {e}")))?;

        if !output.status.success() {
            return Err(RuleError::ToolchainUnavailable(format!(
                "'{rustc} --version' exited with {}",
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(rustc = %rustc, version = %version, "rule toolchain detected");

        Ok(Self {
            rustc: rustc.to_string(),
            version,
        })
    }

    pub fn rustc(&self) -> &str {
        &self.rustc
    }

    /// Version banner, e.g. `rustc 1.82.0 (f6e511eec 2024-10-15)`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn command(&self) -> Command {
        Command::new(&self.rustc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_compiler_is_unavailable() {
        let err = Toolchain::detect("/nonexistent/herald-rustc").unwrap_err();
        assert!(matches!(err, RuleError::ToolchainUnavailable(_)));
        assert!(err.to_string().contains("/nonexistent/herald-rustc"));
    }
}
