//! Symbols and calling convention shared with compiled rule units.

use std::ffi::c_void;

use libloading::Library;

use crate::error::{Result, RuleError};

/// Must equal `RULE_ABI_VERSION` in the contract prelude.
pub const RULE_ABI_VERSION: u32 = 1;

pub(crate) const STATUS_OK: i32 = 0;
const STATUS_DECODE: i32 = -1;
const STATUS_PANIC: i32 = -2;
const STATUS_NULL: i32 = -3;

pub(crate) const SYM_ABI_VERSION: &[u8] = b"herald_rule_abi_version\0";
pub(crate) const SYM_ENTRY_POINT: &[u8] = b"herald_rule_entry_point\0";
pub(crate) const SYM_NEW: &[u8] = b"herald_rule_new\0";
pub(crate) const SYM_EVALUATE: &[u8] = b"herald_rule_evaluate\0";
pub(crate) const SYM_DESCRIBE: &[u8] = b"herald_rule_describe\0";
pub(crate) const SYM_FREE_TEXT: &[u8] = b"herald_rule_free_text\0";
pub(crate) const SYM_DESTROY: &[u8] = b"herald_rule_destroy\0";

/// Every export a unit must provide.
pub(crate) const EXPORTED_SYMBOLS: [&[u8]; 7] = [
    SYM_ABI_VERSION,
    SYM_ENTRY_POINT,
    SYM_NEW,
    SYM_EVALUATE,
    SYM_DESCRIBE,
    SYM_FREE_TEXT,
    SYM_DESTROY,
];

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type EntryPointFn = unsafe extern "C" fn(*mut usize) -> *const u8;
pub(crate) type NewFn = unsafe extern "C" fn() -> *mut c_void;
pub(crate) type EvaluateFn = unsafe extern "C" fn(*mut c_void, *const u8, usize, *mut u8) -> i32;
pub(crate) type DescribeFn =
    unsafe extern "C" fn(*mut c_void, *const u8, usize, *mut *mut u8, *mut usize) -> i32;
pub(crate) type FreeTextFn = unsafe extern "C" fn(*mut u8, usize);
pub(crate) type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Function pointers resolved from one library.
///
/// Only valid while that library stays loaded.
#[derive(Clone, Copy)]
pub(crate) struct RuleVTable {
    abi_version: AbiVersionFn,
    entry_point: EntryPointFn,
    pub(crate) new: NewFn,
    pub(crate) evaluate: EvaluateFn,
    pub(crate) describe: DescribeFn,
    pub(crate) free_text: FreeTextFn,
    pub(crate) destroy: DestroyFn,
}

impl RuleVTable {
    /// Resolve every export; a missing one is a contract violation.
    ///
    /// # Safety
    /// The symbols must have the signatures above, which holds for units
    /// built from the generated crate root.
    pub(crate) unsafe fn resolve(library: &Library) -> Result<Self> {
        Ok(Self {
            abi_version: symbol(library, SYM_ABI_VERSION)?,
            entry_point: symbol(library, SYM_ENTRY_POINT)?,
            new: symbol(library, SYM_NEW)?,
            evaluate: symbol(library, SYM_EVALUATE)?,
            describe: symbol(library, SYM_DESCRIBE)?,
            free_text: symbol(library, SYM_FREE_TEXT)?,
            destroy: symbol(library, SYM_DESTROY)?,
        })
    }

    pub(crate) unsafe fn abi_version(&self) -> u32 {
        (self.abi_version)()
    }

    /// Entry-point name baked into the unit.
    pub(crate) unsafe fn exported_entry_point(&self) -> String {
        let mut len = 0usize;
        let ptr = (self.entry_point)(&mut len);
        if ptr.is_null() {
            return String::new();
        }
        String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    library.get::<T>(name).map(|sym| *sym).map_err(|e| {
        RuleError::ContractViolation(format!("unit does not export `{}`: {e}", symbol_name(name)))
    })
}

pub(crate) fn symbol_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned()
}

/// Error for a non-zero status returned by `op`.
pub(crate) fn status_error(op: &str, status: i32) -> RuleError {
    let reason = match status {
        STATUS_DECODE => "unit could not decode the context".to_string(),
        STATUS_PANIC => "rule panicked".to_string(),
        STATUS_NULL => "null argument".to_string(),
        other => format!("unknown status {other}"),
    };
    RuleError::Evaluation(format!("{op}: {reason}"))
}
