//! Opening compiled rule units and instantiating their entry point.

pub(crate) mod abi;

use std::ffi::c_void;
use std::sync::Arc;

use herald_core::NotificationContext;
use libloading::Library;
use tracing::debug;

use crate::compiler::Artifact;
use crate::error::{Result, RuleError};
use crate::rule::NotificationRule;

pub use abi::RULE_ABI_VERSION;

use abi::{status_error, RuleVTable, STATUS_OK};

/// Loads [`Artifact`]s into live rule instances.
///
/// Each call opens its own library handle from the artifact's own file, so
/// two rules declaring the same type name never see each other. Nothing is
/// cached here.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleLoader;

impl RuleLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self, artifact: &Artifact) -> Result<Arc<dyn NotificationRule>> {
        let path = artifact.library_path();
        let library = unsafe { Library::new(path) }
            .map_err(|e| RuleError::Load(format!("{}: {e}", path.display())))?;

        let vtable = unsafe { RuleVTable::resolve(&library)? };

        let version = unsafe { vtable.abi_version() };
        if version != RULE_ABI_VERSION {
            return Err(RuleError::ContractViolation(format!(
                "unit ABI version {version}, host expects {RULE_ABI_VERSION}"
            )));
        }

        let exported = unsafe { vtable.exported_entry_point() };
        if exported != artifact.entry_point() {
            return Err(RuleError::ContractViolation(format!(
                "unit exports `{exported}` but `{}` was expected",
                artifact.entry_point()
            )));
        }

        let handle = unsafe { (vtable.new)() };
        if handle.is_null() {
            return Err(RuleError::Instantiation(format!(
                "constructor of `{}` panicked",
                artifact.qualified_name()
            )));
        }

        debug!(
            entry_point = %artifact.entry_point(),
            library = %path.display(),
            "rule unit loaded"
        );

        Ok(Arc::new(LoadedRule {
            handle,
            vtable,
            entry_point: artifact.entry_point().to_string(),
            _library: library,
        }))
    }
}

/// An instance living inside a loaded unit.
///
/// Field order matters: the instance is destroyed in `drop` before the
/// library (declared last) is unloaded.
struct LoadedRule {
    handle: *mut c_void,
    vtable: RuleVTable,
    entry_point: String,
    _library: Library,
}

// The unit-side trait requires `Send + Sync` of every rule type, and the
// handle is never handed out.
unsafe impl Send for LoadedRule {}
unsafe impl Sync for LoadedRule {}

impl LoadedRule {
    fn wire(context: &NotificationContext) -> Result<Vec<u8>> {
        context
            .to_wire()
            .map_err(|e| RuleError::Evaluation(format!("cannot encode context: {e}")))
    }
}

impl NotificationRule for LoadedRule {
    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn evaluate(&self, context: &NotificationContext) -> Result<bool> {
        let wire = Self::wire(context)?;
        let mut holds = 0u8;
        let status =
            unsafe { (self.vtable.evaluate)(self.handle, wire.as_ptr(), wire.len(), &mut holds) };
        if status != STATUS_OK {
            return Err(status_error("evaluate", status));
        }
        Ok(holds != 0)
    }

    fn describe(&self, context: &NotificationContext) -> Result<String> {
        let wire = Self::wire(context)?;
        let mut ptr: *mut u8 = std::ptr::null_mut();
        let mut len = 0usize;
        let status = unsafe {
            (self.vtable.describe)(self.handle, wire.as_ptr(), wire.len(), &mut ptr, &mut len)
        };
        if status != STATUS_OK {
            return Err(status_error("describe", status));
        }
        if ptr.is_null() {
            return Ok(String::new());
        }
        let text = unsafe {
            let text = String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned();
            (self.vtable.free_text)(ptr, len);
            text
        };
        Ok(text)
    }
}

impl Drop for LoadedRule {
    fn drop(&mut self) {
        unsafe { (self.vtable.destroy)(self.handle) };
    }
}
