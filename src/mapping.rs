//! Ignition → TwinCAT data type mapping.
//!
//! One explicit table, no duplicate keys. Legacy aliases found in older
//! exports (`Float4`, `Int16`, ...) live in their own section and map to the
//! same targets as the canonical spellings. Lookup is exact and
//! case-sensitive; a miss passes the source type through unchanged so the
//! caller can emit it as-is with a warning.
//!
//! References: Ignition tag data types and TwinCAT IEC 61131-3 data types.

use indexmap::IndexMap;
use once_cell::sync::Lazy;

static TYPE_TABLE: Lazy<IndexMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = IndexMap::new();

    // Canonical Ignition primitives
    m.insert("Boolean", "BOOL");
    m.insert("Byte", "USINT"); // Ignition Byte is 0-255
    m.insert("Short", "INT");
    m.insert("Integer", "DINT");
    m.insert("Long", "LINT");
    m.insert("Float", "REAL");
    m.insert("Double", "LREAL");
    m.insert("String", "STRING");
    m.insert("DateTime", "DT");

    // Legacy/alternate spellings seen in exports
    m.insert("Float4", "REAL");
    m.insert("Float8", "LREAL");
    m.insert("Int4", "DINT");
    m.insert("Int8", "SINT");
    m.insert("Int16", "INT");
    m.insert("Int32", "DINT");
    m.insert("UInt16", "UINT");
    m.insert("UInt32", "UDINT");

    // Array types
    m.insert("Boolean Array", "ARRAY[0..255] OF BOOL");
    m.insert("Byte Array", "ARRAY[0..255] OF USINT");
    m.insert("Short Array", "ARRAY[0..255] OF INT");
    m.insert("Integer Array", "ARRAY[0..255] OF DINT");
    m.insert("Long Array", "ARRAY[0..255] OF LINT");
    m.insert("Float Array", "ARRAY[0..255] OF REAL");
    m.insert("Double Array", "ARRAY[0..255] OF LREAL");
    m.insert("String Array", "ARRAY[0..255] OF STRING");
    m.insert("DateTime Array", "ARRAY[0..255] OF DT");

    // Shorthand array names sometimes found in exports
    m.insert("StringArray", "ARRAY[0..255] OF STRING");

    m
});

/// Map a source type name to its TwinCAT counterpart.
///
/// Returns `(target, matched)`. On a miss the input is returned unchanged
/// with `matched = false`; the caller decides how loudly to warn.
pub fn map_type(source: &str) -> (String, bool) {
    match TYPE_TABLE.get(source) {
        Some(target) => ((*target).to_string(), true),
        None => (source.to_string(), false),
    }
}

/// Default initializer literal for a mapped TwinCAT type, if one applies.
/// Arrays and unmapped types get none (TwinCAT zero-initializes arrays).
pub fn default_literal(twincat_type: &str) -> Option<&'static str> {
    match twincat_type {
        "BOOL" => Some("FALSE"),
        "REAL" | "LREAL" => Some("0.0"),
        "SINT" | "INT" | "DINT" | "LINT" | "USINT" | "UINT" | "UDINT" | "ULINT" | "BYTE"
        | "WORD" | "DWORD" | "LWORD" => Some("0"),
        "STRING" | "WSTRING" => Some("''"),
        "DT" => Some("DT#1970-01-01-00:00:00"),
        _ => None,
    }
}
