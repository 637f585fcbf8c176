//! Tree walker: flatten a record's node tree into emission order.
//!
//! Pre-order, depth-first. Folders produce no entry of their own; their
//! children appear in place, carrying the folder path as descriptive
//! metadata (never used for identifier collision avoidance). Instance nodes
//! resolve through the shared [`TypeRefMap`]; a miss drops the node with
//! exactly one warning and the rest of the record still emits.

use std::collections::HashSet;

use crate::error::Report;
use crate::model::{AtomicTag, Node};
use crate::names::sanitize_identifier;
use crate::resolver::TypeRefMap;

/// Separator between folder segments in the emitted path metadata.
const PATH_SEP: &str = "_";

/// One flattened, emission-ready entry.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Resolved reference to another record's generated struct.
    Instance {
        name: String,
        type_id: String,
        target_type: String,
    },
    /// Leaf tag plus the folder path it was found under (if any).
    Tag {
        tag: AtomicTag,
        folder_path: Option<String>,
    },
}

impl Entry {
    /// Sanitized identifier this entry declares in the output struct.
    pub fn identifier(&self) -> String {
        match self {
            Entry::Instance { name, .. } => sanitize_identifier(name),
            Entry::Tag { tag, .. } => sanitize_identifier(&tag.name),
        }
    }
}

/// Flatten `nodes` against the read-only reference table.
///
/// Also checks the produced identifiers for collisions within this one
/// struct; collisions are flagged, never corrected.
pub fn classify(nodes: &[Node], refs: &TypeRefMap, report: &mut Report) -> Vec<Entry> {
    let mut out = Vec::new();
    walk(nodes, None, refs, report, &mut out);

    let mut seen = HashSet::new();
    for entry in &out {
        let ident = entry.identifier();
        if !seen.insert(ident.clone()) {
            report.warn(format!("duplicate identifier '{ident}' in generated struct"));
        }
    }

    out
}

fn walk(
    nodes: &[Node],
    path: Option<&str>,
    refs: &TypeRefMap,
    report: &mut Report,
    out: &mut Vec<Entry>,
) {
    for node in nodes {
        match node {
            Node::Folder(folder) => {
                let segment = sanitize_identifier(&folder.name);
                let child_path = match path {
                    Some(prefix) => format!("{prefix}{PATH_SEP}{segment}"),
                    None => segment,
                };
                walk(&folder.children, Some(&child_path), refs, report, out);
            }
            Node::TypedInstance(instance) => match refs.resolve(&instance.type_id) {
                Some(target) => out.push(Entry::Instance {
                    name: instance.name.clone(),
                    type_id: instance.type_id.clone(),
                    target_type: target.to_string(),
                }),
                None => report.warn(format!(
                    "instance '{}': unresolved type id '{}', dropped",
                    instance.name, instance.type_id
                )),
            },
            Node::Atomic(tag) => out.push(Entry::Tag {
                tag: tag.clone(),
                folder_path: path.map(str::to_string),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    fn nodes_of(v: serde_json::Value) -> Vec<Node> {
        let mut report = Report::new();
        Record::from_value(v, &mut report).unwrap().nodes
    }

    #[test]
    fn nested_folders_flatten_in_place_with_joined_path() {
        let nodes = nodes_of(json!({
            "name": "X",
            "tags": [
                {"name": "A", "tagType": "Folder", "tags": [
                    {"name": "B", "tagType": "Folder", "tags": [
                        {"name": "x", "dataType": "Float"},
                    ]},
                ]},
                {"name": "top", "dataType": "Boolean"},
            ]
        }));
        let mut report = Report::new();
        let entries = classify(&nodes, &TypeRefMap::new(), &mut report);

        assert_eq!(entries.len(), 2);
        let Entry::Tag { tag, folder_path } = &entries[0] else { panic!() };
        assert_eq!(tag.name, "x");
        assert_eq!(folder_path.as_deref(), Some("A_B"));
        let Entry::Tag { folder_path, .. } = &entries[1] else { panic!() };
        assert_eq!(folder_path.as_deref(), None);
    }

    #[test]
    fn unresolved_instance_drops_with_one_warning() {
        let nodes = nodes_of(json!({
            "name": "X",
            "tags": [
                {"name": "alarm", "tagType": "UdtInstance", "typeId": "RW_Standard/RW_Missing"},
                {"name": "ok", "dataType": "Float"},
            ]
        }));
        let mut report = Report::new();
        let entries = classify(&nodes, &TypeRefMap::new(), &mut report);

        assert_eq!(entries.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("RW_Missing"));
    }

    #[test]
    fn resolved_instance_keeps_its_place_in_order() {
        let mut report = Report::new();
        let mut refs = TypeRefMap::new();
        refs.insert("RW_Alarm_Basic", &mut report);

        let nodes = nodes_of(json!({
            "name": "X",
            "tags": [
                {"name": "first", "dataType": "Float"},
                {"name": "alm", "tagType": "UdtInstance", "typeId": "RW_Standard/RW_Alarm_Basic"},
                {"name": "last", "dataType": "Float"},
            ]
        }));
        let entries = classify(&nodes, &refs, &mut report);
        assert_eq!(entries.len(), 3);
        let Entry::Instance { target_type, .. } = &entries[1] else { panic!() };
        assert_eq!(target_type, "ST_RW_AlarmBasic_HMI_IgnitionExp");
    }

    #[test]
    fn identifier_collisions_are_flagged_not_fixed() {
        let nodes = nodes_of(json!({
            "name": "X",
            "tags": [
                {"name": "My Tag", "dataType": "Float"},
                {"name": "My#Tag", "dataType": "Float"},
            ]
        }));
        let mut report = Report::new();
        let entries = classify(&nodes, &TypeRefMap::new(), &mut report);
        assert_eq!(entries.len(), 2); // both kept
        assert!(report.warnings.iter().any(|w| w.contains("My_Tag")));
    }
}
