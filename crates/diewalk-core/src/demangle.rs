//! Linkage name demangling.
//!
//! Only Rust manglings (legacy `_ZN...E` and v0 `_R...`) are recognised.
//! Anything else is reported as-is.

use rustc_demangle::try_demangle;

use crate::records::FieldValue;

/// Demangled form of `raw`, when it is a Rust symbol.
pub fn demangle(raw: &str) -> Option<String>
{
    try_demangle(raw).ok().map(|symbol| symbol.to_string())
}

/// Build a symbol field value from a raw linkage name.
pub(crate) fn make_symbol(raw: String) -> FieldValue
{
    let demangled = demangle(&raw);
    FieldValue::Symbol { raw, demangled }
}
