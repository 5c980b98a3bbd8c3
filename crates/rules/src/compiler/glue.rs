//! Generated crate root for a rule unit.
//!
//! The rule source is included into the fixed `rules` module with the
//! prelude glob-imported, and the entry-point type is exposed through the
//! C ABI the loader resolves.

/// Namespace module every rule type is compiled into.
pub const RULE_NAMESPACE: &str = "rules";

/// Contents of `lib.rs` for a unit whose entry point is `entry_point`.
pub(crate) fn crate_root(entry_point: &str) -> String {
    format!(
        r#"#![allow(dead_code, unused_imports, unused_variables, unused_mut, non_snake_case)]

#[path = "prelude.rs"]
pub mod prelude;

pub mod {ns} {{
    use crate::prelude::*;

    include!("{entry}.rs");
}}

const ENTRY_POINT: &str = "{entry}";

#[no_mangle]
pub extern "C" fn herald_rule_abi_version() -> u32 {{
    prelude::RULE_ABI_VERSION
}}

#[no_mangle]
pub unsafe extern "C" fn herald_rule_entry_point(len: *mut usize) -> *const u8 {{
    if !len.is_null() {{
        *len = ENTRY_POINT.len();
    }}
    ENTRY_POINT.as_ptr()
}}

#[no_mangle]
pub extern "C" fn herald_rule_new() -> *mut ::std::ffi::c_void {{
    prelude::abi::instantiate::<{ns}::{entry}>()
}}

#[no_mangle]
pub unsafe extern "C" fn herald_rule_evaluate(
    handle: *mut ::std::ffi::c_void,
    ctx: *const u8,
    ctx_len: usize,
    out: *mut u8,
) -> i32 {{
    prelude::abi::evaluate(handle, ctx, ctx_len, out)
}}

#[no_mangle]
pub unsafe extern "C" fn herald_rule_describe(
    handle: *mut ::std::ffi::c_void,
    ctx: *const u8,
    ctx_len: usize,
    out_ptr: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {{
    prelude::abi::describe(handle, ctx, ctx_len, out_ptr, out_len)
}}

#[no_mangle]
pub unsafe extern "C" fn herald_rule_free_text(ptr: *mut u8, len: usize) {{
    prelude::abi::free_text(ptr, len)
}}

#[no_mangle]
pub unsafe extern "C" fn herald_rule_destroy(handle: *mut ::std::ffi::c_void) {{
    prelude::abi::destroy(handle)
}}
"#,
        ns = RULE_NAMESPACE,
        entry = entry_point,
    )
}
