//! Identifier and struct-name transforms.
//!
//! Both transforms are pure and deterministic; re-applying them to an
//! already-transformed name is a no-op (callers rely on that when output
//! names flow back through the pipeline).

use once_cell::sync::Lazy;
use regex::Regex;

/// Organizational prefix the source UDT corpus uses.
pub const ORG_PREFIX: &str = "RW";
/// Suffix appended to every generated struct name.
pub const STRUCT_SUFFIX: &str = "_HMI_IgnitionExp";

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_V\d+$").unwrap());
static ILLEGAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());
static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Force a name into the IEC identifier alphabet: `[A-Za-z0-9_]`, no doubled
/// or dangling underscores, never starting with a digit, never empty.
///
/// `"My Tag #1"` → `"My_Tag_1"`; a name with no legal characters at all
/// degrades to `"_"`.
pub fn sanitize_identifier(name: &str) -> String {
    let replaced = ILLEGAL_CHARS.replace_all(name, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        return "_".to_string();
    }

    let mut out = trimmed.to_string();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Derive the TwinCAT struct name from a UDT name.
///
/// `RW_Analog_In` → `ST_RW_AnalogIn_HMI_IgnitionExp`; a trailing `_V<n>` is
/// stripped first so every revision of one UDT lands on the same struct name.
/// Names outside the `RW_*` convention fall back to
/// `ST_<NameWithoutUnderscores><suffix>`.
pub fn to_target_struct_name(record_name: &str) -> String {
    let name = VERSION_SUFFIX.replace(record_name, "");

    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() >= 3 && parts[0] == ORG_PREFIX {
        let middle: String = parts[1..].iter().map(|p| capitalize(p)).collect();
        format!("ST_{ORG_PREFIX}_{middle}{STRUCT_SUFFIX}")
    } else {
        format!("ST_{}{STRUCT_SUFFIX}", name.replace('_', ""))
    }
}

/// First char upper, rest lower.
fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
    }
}
