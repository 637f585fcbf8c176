//! Corpus-wide type reference table.
//!
//! UdtInstance nodes reference other records by `typeId`
//! (`RW_Standard/RW_Alarm` in the exports we handle). The table maps every
//! eligible record in a corpus directory to its generated struct name, built
//! once up front by the caller and passed read-only into classification —
//! never discovered from a filesystem convention inside the walker.
//!
//! Duplicate type ids are last-write-wins, surfaced as a warning (the input
//! is ambiguous; deduplicate the corpus with `extract` first).

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Report;
use crate::names::to_target_struct_name;

/// Ignition type-folder path the source corpus lives under.
pub const TYPE_NAMESPACE: &str = "RW_Standard";

#[derive(Debug, Default, Clone)]
pub struct TypeRefMap {
    map: IndexMap<String, String>,
}

impl TypeRefMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one record name. Inserts both the namespaced id and the bare
    /// name so unqualified `typeId`s still resolve.
    pub fn insert(&mut self, record_name: &str, report: &mut Report) {
        let target = to_target_struct_name(record_name);
        let namespaced = format!("{TYPE_NAMESPACE}/{record_name}");
        if let Some(previous) = self.map.insert(namespaced.clone(), target.clone()) {
            // Ambiguous corpus, not an error: last write wins.
            report.warn(format!(
                "duplicate type id '{namespaced}' (was '{previous}', now '{target}'); last write wins"
            ));
        }
        self.map.insert(record_name.to_string(), target);
    }

    /// Resolve an instance's `typeId`. Exact match first, then the last
    /// path component (exports are inconsistent about carrying the folder).
    pub fn resolve(&self, type_id: &str) -> Option<&str> {
        if let Some(target) = self.map.get(type_id) {
            return Some(target);
        }
        let tail = type_id.rsplit('/').next()?;
        self.map.get(tail).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pre-scan a corpus directory (non-recursive `*.json`). Reads only each
    /// record's top-level `name`; files that fail to parse are skipped with
    /// a warning, never aborting the scan.
    pub fn scan_dir(dir: &Path, report: &mut Report) -> TypeRefMap {
        let mut out = TypeRefMap::new();

        let pattern = dir.join("*.json");
        let paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                report.warn(format!("bad corpus pattern {}: {e}", pattern.display()));
                return out;
            }
        };

        for entry in paths {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    report.warn(format!("unreadable corpus entry: {e}"));
                    continue;
                }
            };
            let source = match std::fs::read_to_string(&path) {
                Ok(s) => s,
                Err(e) => {
                    report.warn(format!("skipping {}: {e}", path.display()));
                    continue;
                }
            };
            let value: Value = match serde_json::from_str(&source) {
                Ok(v) => v,
                Err(e) => {
                    report.warn(format!("skipping {} (invalid JSON): {e}", path.display()));
                    continue;
                }
            };
            match value.get("name").and_then(Value::as_str) {
                Some(name) => out.insert(name, report),
                None => report.warn(format!("skipping {} (no record name)", path.display())),
            }
        }

        out
    }
}
