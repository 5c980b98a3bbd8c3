//! Temporary per-compile build directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::glue;
use crate::error::{Result, RuleError};

/// Rule contract compiled into every unit as `prelude.rs`.
pub const PRELUDE_SOURCE: &str = include_str!("../../contract/prelude.rs");

/// A scratch directory holding one unit's sources and build output.
///
/// Removed when dropped, on success and failure alike.
pub(crate) struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    pub(crate) fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("herald-build-");
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| {
                    RuleError::Workspace(format!("cannot create {}: {e}", root.display()))
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| RuleError::Workspace(format!("cannot allocate build directory: {e}")))?;

        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the prelude, the rule source as `<entry_point>.rs` and the crate
    /// root. Returns the crate root path.
    pub(crate) fn write_sources(&self, entry_point: &str, source: &str) -> Result<PathBuf> {
        self.write("prelude.rs", PRELUDE_SOURCE)?;
        self.write(&source_file_name(entry_point), source)?;
        self.write("lib.rs", &glue::crate_root(entry_point))
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)
            .map_err(|e| RuleError::Workspace(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }
}

/// File the rule source is written to; named after the declared type.
pub(crate) fn source_file_name(entry_point: &str) -> String {
    format!("{entry_point}.rs")
}
