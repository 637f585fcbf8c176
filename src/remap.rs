//! KEPware → Beckhoff field remapping (format-A).
//!
//! Rewrites a record in place: source-specific connection parameters are
//! replaced by templated Beckhoff ones, and each convertible atomic tag gets
//! its address binding, value source, and server reference moved to the new
//! convention. The injected parameter values are deliberate placeholders —
//! the operator fills in the real tag path and server name afterwards.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::model::{AtomicTag, Node, Record, ServerRef, ValueSource};

// ————————————————————————————————————————————————————————————————————————————
// FIXED CONVENTION
// ————————————————————————————————————————————————————————————————————————————

/// Parameters specific to the KEPware setup; dropped on conversion.
const SOURCE_PARAMS: [&str; 3] = ["Node", "TIA_PLC_Name", "Datablock_Name"];

/// Injected parameter carrying the target address path.
pub const PARAM_TAG_PATH: &str = "OPCTagPath";
/// Injected parameter carrying the target server name.
pub const PARAM_SERVER: &str = "OPCServer";

const TAG_PATH_PLACEHOLDER: &str = "nsu=urn:BeckhoffAutomation:Ua:PLC1;s=MAIN.YourTagNameHere";
const SERVER_PLACEHOLDER: &str = "Beckhoff@YourComputerName";

/// Middle segment of every rewritten address binding.
const BINDING_MIDDLE: &str = "hmiIgnition";

/// Marker tokens identifying a KEPware-style binding.
const SOURCE_MARKERS: [&str; 2] = ["KEPServerEX", "{Node}"];

/// Status word referenced by bit-extraction expressions.
const STATUS_FIELD_TOKEN: &str = "{[.]S_HMISts}";

static PARAM_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{.*?\}").unwrap());

// ————————————————————————————————————————————————————————————————————————————
// STATS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemapStats {
    pub parameters_updated: u64,
    pub bindings_rewritten: u64,
    pub value_sources_switched: u64,
    pub expressions_removed: u64,
    pub servers_rebound: u64,
    pub tags_skipped: u64,
}

impl RemapStats {
    pub fn merge(&mut self, other: &RemapStats) {
        self.parameters_updated += other.parameters_updated;
        self.bindings_rewritten += other.bindings_rewritten;
        self.value_sources_switched += other.value_sources_switched;
        self.expressions_removed += other.expressions_removed;
        self.servers_rebound += other.servers_rebound;
        self.tags_skipped += other.tags_skipped;
    }
}

// ————————————————————————————————————————————————————————————————————————————
// REMAP
// ————————————————————————————————————————————————————————————————————————————

pub fn remap_record(record: &mut Record) -> RemapStats {
    let mut stats = RemapStats::default();
    remap_parameters(record, &mut stats);
    remap_nodes(&mut record.nodes, &mut stats);
    stats
}

/// Drop source-specific parameters and inject the two templated target
/// parameters up front; everything else keeps its value and order.
fn remap_parameters(record: &mut Record, stats: &mut RemapStats) {
    let mut params = indexmap::IndexMap::new();
    params.insert(
        PARAM_TAG_PATH.to_string(),
        json!({"dataType": "String", "value": TAG_PATH_PLACEHOLDER}),
    );
    params.insert(
        PARAM_SERVER.to_string(),
        json!({"dataType": "String", "value": SERVER_PLACEHOLDER}),
    );
    for (name, value) in record.parameters.drain(..) {
        if !SOURCE_PARAMS.contains(&name.as_str()) {
            params.insert(name, value);
        }
    }
    record.parameters = params;
    stats.parameters_updated += 1;
}

fn remap_nodes(nodes: &mut [Node], stats: &mut RemapStats) {
    for node in nodes {
        match node {
            Node::Folder(folder) => remap_nodes(&mut folder.children, stats),
            // Instance nodes inherit their type's conversion; nothing to do here.
            Node::TypedInstance(_) => {}
            Node::Atomic(tag) => {
                if should_convert(tag) {
                    remap_tag(tag, stats);
                } else {
                    stats.tags_skipped += 1;
                }
            }
        }
    }
}

/// Convert only tags that represent actual PLC variables.
///
/// `opc` → always; `expr` → only when it reads OPC data (has a binding);
/// `memory` → never (Ignition-internal); anything else → only with a binding.
/// Pure: depends on this node's fields alone.
pub fn should_convert(tag: &AtomicTag) -> bool {
    let has_binding = tag.address_binding.is_some();
    match &tag.value_source {
        Some(ValueSource::Opc) => true,
        Some(ValueSource::Expr) => has_binding,
        Some(ValueSource::Memory) => false,
        Some(ValueSource::Other(_)) | None => has_binding,
    }
}

fn remap_tag(tag: &mut AtomicTag, stats: &mut RemapStats) {
    // 1) Address binding: KEPware path → templated Beckhoff path.
    if let Some(ab) = &mut tag.address_binding {
        if SOURCE_MARKERS.iter().any(|m| ab.binding.contains(m)) {
            ab.binding = rewrite_binding(&ab.binding, &tag.name);
            stats.bindings_rewritten += 1;
        }
    }

    // 2) Boolean bit-extraction expressions become direct OPC reads.
    if tag.data_type == "Boolean" && tag.value_source == Some(ValueSource::Expr) {
        let is_bit_extraction = tag
            .expression
            .as_deref()
            .is_some_and(|e| e.contains('&') && e.contains(STATUS_FIELD_TOKEN));
        if is_bit_extraction {
            tag.value_source = Some(ValueSource::Opc);
            tag.expression = None;
            stats.value_sources_switched += 1;
            stats.expressions_removed += 1;
        }
    }

    // 3) Hardcoded server names become parameter bindings.
    if let Some(ServerRef::Literal(_)) = &tag.server_ref {
        let mut obj = Map::new();
        obj.insert("bindType".into(), Value::from("parameter"));
        obj.insert("binding".into(), Value::from(format!("{{{PARAM_SERVER}}}")));
        tag.server_ref = Some(ServerRef::Binding(obj));
        stats.servers_rebound += 1;
    }
}

/// `...KEPServerEX...{Node}.DB.TagName` → `{OPCTagPath}.hmiIgnition.TagName`.
///
/// The suffix is the last dot-separated component with `{...}` placeholders
/// stripped; an empty suffix falls back to the tag's own name.
fn rewrite_binding(binding: &str, tag_name: &str) -> String {
    let last = binding.rsplit('.').next().unwrap_or("");
    let suffix = PARAM_PLACEHOLDER.replace_all(last, "").into_owned();
    let suffix = if suffix.is_empty() { tag_name } else { &suffix };
    format!("{{{PARAM_TAG_PATH}}}.{BINDING_MIDDLE}.{suffix}")
}
