//! Name mangling (spec §4.1).
//!
//! Overloaded functions emit as `name$T1$T2$…`, where each `Tᵢ` is
//! `minz_types::Type::mangle()`'s canonical encoding of the
//! corresponding parameter type. The return type never participates.
//! Non-overloaded functions keep their source name, optionally
//! module-prefixed (`module.name` at source level becomes
//! `module_name` in assembly).

use minz_types::Type;

/// Mangle a (possibly module-prefixed) function name against its
/// parameter types. `is_overloaded` selects between the bare source
/// name and the `$T1$T2$…`-suffixed form; non-overloaded functions
/// never pay the mangling cost so hand-written assembly that calls
/// them by source name keeps working.
pub fn mangle_function(name: &str, params: &[Type], is_overloaded: bool) -> String {
    let base = module_prefixed(name);
    if !is_overloaded {
        return base;
    }
    let mut out = base;
    for p in params {
        out.push('$');
        out.push_str(&p.mangle());
    }
    out
}

/// `module.name` (source) -> `module_name` (assembly label).
pub fn module_prefixed(name: &str) -> String {
    name.replace('.', "_")
}

/// `Type_Interface_method$Type$…` (spec §4.6).
pub fn mangle_interface_method(type_name: &str, interface_name: &str, method: &str, params: &[Type]) -> String {
    let mut out = format!("{type_name}_{interface_name}_{method}");
    for p in params {
        out.push('$');
        out.push_str(&p.mangle());
    }
    out
}

/// `parent$lambda_N` (spec §4.4).
pub fn mangle_lambda(parent: &str, index: u32) -> String {
    format!("{parent}$lambda_{index}")
}
