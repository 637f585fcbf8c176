//! Revision disambiguation over an ambiguous UDT naming convention.
//!
//! A corpus may carry several revisions of one logical UDT: `RW_Sensor`,
//! `RW_Sensor_V2`, `RW_Sensor_TEST`, `RW_Sensor_Hybrid_New`, ... Grouping is
//! by a derived base name (revision markers stripped, most specific pattern
//! first) and exactly one revision per group survives, picked by an ordered
//! priority with a lexicographic tie-break on the full name.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::Report;

/// Records outside this prefix are excluded from the corpus before grouping.
pub const REQUIRED_PREFIX: &str = "RW_";

/// Revision-marker suffixes, most specific first: combined marker+qualifier
/// forms must strip before their single-marker tails would match.
static REVISION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"_Hybrid\s+TEST$",
        r"_Hybrid_TEST$",
        r"_Hybrid_New$",
        r"_Hybrid_Reverse$",
        r"_V\d+$",
        r"_TEST$",
        r"_New$",
        r"_Reverse$",
        r"_Hybrid$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

static NUMBERED_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)_v(\d+)$").unwrap());

/// Strip revision markers to get the grouping key.
pub fn derive_base_name(name: &str) -> String {
    let mut base = name.to_string();
    for marker in REVISION_MARKERS.iter() {
        base = marker.replace(&base, "").into_owned();
    }
    base
}

/// Ordered revision priority. Higher wins.
///
/// test-marked → 0, `_V<n>` → 1000+n, `_New` → 100, `_Reverse` → 90,
/// `_Hybrid` → 80, unqualified base → 50.
pub fn version_priority(name: &str) -> i64 {
    let lower = name.to_lowercase();

    if lower.contains("test") {
        return 0;
    }
    if let Some(caps) = NUMBERED_VERSION.captures(&lower) {
        let n: i64 = caps[1].parse().unwrap_or(0);
        return 1000 + n;
    }
    if lower.ends_with("_new") {
        return 100;
    }
    if lower.ends_with("_reverse") {
        return 90;
    }
    if lower.ends_with("_hybrid") {
        return 80;
    }
    50
}

/// Per-group selection detail, kept for the extraction report.
#[derive(Debug, Clone)]
pub struct GroupSelection {
    pub base: String,
    pub winner: String,
    /// `(name, priority)` of every candidate in the group, winner included.
    pub candidates: Vec<(String, i64)>,
}

/// Outcome of deduplicating one corpus.
#[derive(Debug, Default)]
pub struct Selection {
    /// Winning record per group, keyed by the winner's full name.
    pub winners: IndexMap<String, Value>,
    pub groups: Vec<GroupSelection>,
    /// Names excluded up front for lacking the required prefix.
    pub excluded: Vec<String>,
}

/// Group `(name, record)` pairs by derived base name and keep one winner per
/// group: max by `(priority, name)`. Losing revisions are reported as
/// informational, never errors.
pub fn select_latest(records: Vec<(String, Value)>, report: &mut Report) -> Selection {
    let mut out = Selection::default();

    let mut groups: IndexMap<String, Vec<(String, i64, Value)>> = IndexMap::new();
    for (name, data) in records {
        if !name.starts_with(REQUIRED_PREFIX) {
            report.info(format!("skipping '{name}' (doesn't start with '{REQUIRED_PREFIX}')"));
            out.excluded.push(name);
            continue;
        }
        let base = derive_base_name(&name);
        let priority = version_priority(&name);
        groups.entry(base).or_default().push((name, priority, data));
    }

    for (base, mut members) in groups {
        // Winner: highest (priority, name). Sort ascending, take the last.
        members.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
        let candidates: Vec<(String, i64)> =
            members.iter().map(|(n, p, _)| (n.clone(), *p)).collect();
        let (winner_name, winner_priority, winner_data) = members.pop().expect("non-empty group");

        if candidates.len() > 1 {
            let all: Vec<&str> = candidates.iter().map(|(n, _)| n.as_str()).collect();
            report.info(format!(
                "multiple revisions of '{base}': {all:?} -> selected '{winner_name}' \
                 (priority {winner_priority})"
            ));
        }

        out.groups.push(GroupSelection {
            base,
            winner: winner_name.clone(),
            candidates,
        });
        out.winners.insert(winner_name, winner_data);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_name_strips_markers_most_specific_first() {
        assert_eq!(derive_base_name("RW_Sensor_V2"), "RW_Sensor");
        assert_eq!(derive_base_name("RW_Sensor_TEST"), "RW_Sensor");
        assert_eq!(derive_base_name("RW_Pump_Hybrid_TEST"), "RW_Pump");
        assert_eq!(derive_base_name("RW_Pump_Hybrid New"), "RW_Pump_Hybrid New");
        assert_eq!(derive_base_name("RW_Valve_Hybrid_Reverse"), "RW_Valve");
        assert_eq!(derive_base_name("RW_Valve_hybrid"), "RW_Valve");
        assert_eq!(derive_base_name("RW_Plain"), "RW_Plain");
    }

    #[test]
    fn priorities_follow_the_ordered_rule() {
        assert_eq!(version_priority("RW_Sensor_TEST"), 0);
        assert_eq!(version_priority("RW_Test_Bench"), 0); // "test" anywhere
        assert_eq!(version_priority("RW_Sensor_V2"), 1002);
        assert_eq!(version_priority("RW_Sensor_V13"), 1013);
        assert_eq!(version_priority("RW_Sensor_New"), 100);
        assert_eq!(version_priority("RW_Sensor_Reverse"), 90);
        assert_eq!(version_priority("RW_Sensor_Hybrid"), 80);
        assert_eq!(version_priority("RW_Sensor"), 50);
    }

    #[test]
    fn numbered_version_beats_base_beats_test() {
        let records = vec![
            ("RW_Sensor".to_string(), json!({"v": 1})),
            ("RW_Sensor_V2".to_string(), json!({"v": 2})),
            ("RW_Sensor_TEST".to_string(), json!({"v": 3})),
        ];
        let mut report = Report::new();
        let sel = select_latest(records, &mut report);
        assert_eq!(sel.winners.len(), 1);
        assert_eq!(sel.winners.get("RW_Sensor_V2"), Some(&json!({"v": 2})));
        assert_eq!(sel.groups[0].base, "RW_Sensor");
        assert_eq!(sel.groups[0].candidates.len(), 3);
    }

    #[test]
    fn missing_prefix_excludes_before_grouping() {
        let records = vec![
            ("Sim_Helper".to_string(), json!({})),
            ("RW_Sensor".to_string(), json!({})),
        ];
        let mut report = Report::new();
        let sel = select_latest(records, &mut report);
        assert_eq!(sel.excluded, vec!["Sim_Helper".to_string()]);
        assert_eq!(sel.winners.len(), 1);
    }

    #[test]
    fn name_breaks_priority_ties_deterministically() {
        // Both test-marked (priority 0) and both deriving base "RW_Sensor".
        let records = vec![
            ("RW_Sensor_Hybrid_TEST".to_string(), json!({})),
            ("RW_Sensor_TEST".to_string(), json!({})),
        ];
        let mut report = Report::new();
        let sel = select_latest(records, &mut report);
        assert_eq!(sel.winners.len(), 1);
        // Lexicographically larger name wins the tie.
        assert!(sel.winners.contains_key("RW_Sensor_TEST"));
    }
}
