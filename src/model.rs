//! Record/Node data model for Ignition UDT exports.
//!
//! One input file is one [`Record`]: a name, an ordered parameter map, and an
//! ordered tree of [`Node`]s. Nodes are a closed union over Folder /
//! TypedInstance / Atomic so every consumer (classifier, remapper, emitter)
//! matches exhaustively; a new node kind cannot be silently mis-handled.
//!
//! Decoding is lossy only for broken nodes (missing name or data type →
//! dropped with a warning). Keys we do not model are kept verbatim in each
//! node's `rest` map (`serde_json` runs with `preserve_order`, so they
//! survive a load → transform → save round trip in their original order).

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::Report;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// One exported UDT/tag-group definition.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub parameters: IndexMap<String, Value>,
    pub nodes: Vec<Node>,
    /// Unmodeled top-level keys (`tagType`, `enabled`, ...), original order.
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Folder(Folder),
    TypedInstance(TypedInstance),
    Atomic(AtomicTag),
}

/// Purely organizational; contributes no output element itself.
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub children: Vec<Node>,
    pub rest: Map<String, Value>,
}

/// Reference to another record's generated type, resolved at emission time.
#[derive(Debug, Clone)]
pub struct TypedInstance {
    pub name: String,
    pub type_id: String,
    pub rest: Map<String, Value>,
}

/// Leaf tag carrying one scalar or array-typed value.
#[derive(Debug, Clone)]
pub struct AtomicTag {
    pub name: String,
    pub data_type: String,
    /// Derived from `readOnly` (raw value stays in `rest`).
    pub read_only: bool,
    /// Normalized from `tooltip` (string or `{binding}` object; raw stays in `rest`).
    pub description: Option<String>,
    pub value_source: Option<ValueSource>,
    pub address_binding: Option<AddressBinding>,
    pub server_ref: Option<ServerRef>,
    pub expression: Option<String>,
    pub rest: Map<String, Value>,
}

/// `valueSource` wire values. Unknown spellings round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Opc,
    Expr,
    Memory,
    Other(String),
}

/// `opcItemPath`: the binding text plus its sibling keys (object form), or
/// a bare path string. The wire shape is kept so output matches input.
#[derive(Debug, Clone)]
pub struct AddressBinding {
    pub binding: String,
    /// True when the source carried a plain string instead of a `{binding}` object.
    pub string_form: bool,
    pub rest: Map<String, Value>,
}

/// `opcServer`: either a hardcoded server name or a parameter binding object.
#[derive(Debug, Clone)]
pub enum ServerRef {
    Literal(String),
    Binding(Map<String, Value>),
}

// ————————————————————————————————————————————————————————————————————————————
// DECODE
// ————————————————————————————————————————————————————————————————————————————

impl Record {
    pub fn from_value(v: Value, report: &mut Report) -> Option<Record> {
        let Value::Object(mut map) = v else {
            report.warn("record is not a JSON object");
            return None;
        };

        let name = match map.shift_remove("name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                report.warn("record has no 'name'; using 'UnknownStruct'");
                "UnknownStruct".to_string()
            }
        };

        let parameters = match map.shift_remove("parameters") {
            Some(Value::Object(m)) => m.into_iter().collect(),
            Some(_) => {
                report.warn(format!("record '{name}': 'parameters' is not an object, ignored"));
                IndexMap::new()
            }
            None => IndexMap::new(),
        };

        let nodes = match map.shift_remove("tags") {
            Some(Value::Array(xs)) => xs
                .into_iter()
                .filter_map(|x| Node::from_value(x, report))
                .collect(),
            Some(_) => {
                report.warn(format!("record '{name}': 'tags' is not an array, ignored"));
                Vec::new()
            }
            None => Vec::new(),
        };

        Some(Record { name, parameters, nodes, rest: map })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.clone()));
        map.insert(
            "parameters".into(),
            Value::Object(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        for (k, v) in &self.rest {
            map.insert(k.clone(), v.clone());
        }
        map.insert(
            "tags".into(),
            Value::Array(self.nodes.iter().map(Node::to_value).collect()),
        );
        Value::Object(map)
    }
}

impl Node {
    /// Decode one tag entry. Broken entries (no name, atomic without a data
    /// type, unrecognized kind) return `None` after a warning; they never
    /// abort the record.
    pub fn from_value(v: Value, report: &mut Report) -> Option<Node> {
        let Value::Object(mut map) = v else {
            report.warn("tag entry is not an object, dropped");
            return None;
        };

        let name = match map.shift_remove("name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                report.warn("tag entry without a usable 'name', dropped");
                return None;
            }
        };

        let kind = map
            .get("tagType")
            .and_then(Value::as_str)
            .map(str::to_string);
        match kind.as_deref() {
            Some("Folder") => Some(Node::Folder(Folder::from_map(name, map, report))),
            Some("UdtInstance") => TypedInstance::from_map(name, map, report).map(Node::TypedInstance),
            Some("AtomicTag") => AtomicTag::from_map(name, map, report).map(Node::Atomic),
            // No discriminator but a dataType present → atomic.
            None if map.contains_key("dataType") => {
                AtomicTag::from_map(name, map, report).map(Node::Atomic)
            }
            other => {
                report.warn(format!(
                    "tag '{name}': unrecognized tagType {:?}, dropped",
                    other.unwrap_or("<missing>")
                ));
                None
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Folder(f) => f.to_value(),
            Node::TypedInstance(i) => i.to_value(),
            Node::Atomic(t) => t.to_value(),
        }
    }
}

impl Folder {
    fn from_map(name: String, mut map: Map<String, Value>, report: &mut Report) -> Folder {
        let children = match map.shift_remove("tags") {
            Some(Value::Array(xs)) => xs
                .into_iter()
                .filter_map(|x| Node::from_value(x, report))
                .collect(),
            _ => Vec::new(),
        };
        Folder { name, children, rest: map }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.clone()));
        for (k, v) in &self.rest {
            map.insert(k.clone(), v.clone());
        }
        map.insert(
            "tags".into(),
            Value::Array(self.children.iter().map(Node::to_value).collect()),
        );
        Value::Object(map)
    }
}

impl TypedInstance {
    fn from_map(name: String, mut map: Map<String, Value>, report: &mut Report) -> Option<TypedInstance> {
        let type_id = match map.shift_remove("typeId") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                report.warn(format!("instance '{name}' without a 'typeId', dropped"));
                return None;
            }
        };
        Some(TypedInstance { name, type_id, rest: map })
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.clone()));
        map.insert("typeId".into(), Value::from(self.type_id.clone()));
        for (k, v) in &self.rest {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl AtomicTag {
    fn from_map(name: String, mut map: Map<String, Value>, report: &mut Report) -> Option<AtomicTag> {
        let data_type = match map.shift_remove("dataType") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                report.warn(format!("tag '{name}' without a 'dataType', dropped"));
                return None;
            }
        };

        let value_source = match map.shift_remove("valueSource") {
            Some(Value::String(s)) => Some(ValueSource::from_wire(&s)),
            _ => None,
        };

        let expression = match map.shift_remove("expression") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let address_binding = match map.shift_remove("opcItemPath") {
            Some(Value::Object(mut obj)) => match obj.shift_remove("binding") {
                Some(Value::String(binding)) => {
                    Some(AddressBinding { binding, string_form: false, rest: obj })
                }
                _ => {
                    // Not a structured binding; keep the raw object around.
                    map.insert("opcItemPath".into(), Value::Object(obj));
                    None
                }
            },
            Some(Value::String(s)) => {
                Some(AddressBinding { binding: s, string_form: true, rest: Map::new() })
            }
            Some(other) => {
                map.insert("opcItemPath".into(), other);
                None
            }
            None => None,
        };

        let server_ref = match map.shift_remove("opcServer") {
            Some(Value::String(s)) => Some(ServerRef::Literal(s)),
            Some(Value::Object(obj)) => Some(ServerRef::Binding(obj)),
            Some(other) => {
                map.insert("opcServer".into(), other);
                None
            }
            None => None,
        };

        // Derived fields; the raw keys stay in `rest` for round-tripping.
        let read_only = map.get("readOnly").and_then(Value::as_bool).unwrap_or(false);
        let description = map.get("tooltip").and_then(normalize_tooltip);

        Some(AtomicTag {
            name,
            data_type,
            read_only,
            description,
            value_source,
            address_binding,
            server_ref,
            expression,
            rest: map,
        })
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::from(self.name.clone()));
        map.insert("dataType".into(), Value::from(self.data_type.clone()));
        if let Some(vs) = &self.value_source {
            map.insert("valueSource".into(), Value::from(vs.as_wire().to_string()));
        }
        if let Some(ab) = &self.address_binding {
            if ab.string_form && ab.rest.is_empty() {
                map.insert("opcItemPath".into(), Value::from(ab.binding.clone()));
            } else {
                let mut obj = Map::new();
                obj.insert("binding".into(), Value::from(ab.binding.clone()));
                for (k, v) in &ab.rest {
                    obj.insert(k.clone(), v.clone());
                }
                map.insert("opcItemPath".into(), Value::Object(obj));
            }
        }
        if let Some(server) = &self.server_ref {
            let v = match server {
                ServerRef::Literal(s) => Value::from(s.clone()),
                ServerRef::Binding(obj) => Value::Object(obj.clone()),
            };
            map.insert("opcServer".into(), v);
        }
        if let Some(expr) = &self.expression {
            map.insert("expression".into(), Value::from(expr.clone()));
        }
        for (k, v) in &self.rest {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl ValueSource {
    pub fn from_wire(s: &str) -> ValueSource {
        match s {
            "opc" => ValueSource::Opc,
            "expr" => ValueSource::Expr,
            "memory" => ValueSource::Memory,
            other => ValueSource::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            ValueSource::Opc => "opc",
            ValueSource::Expr => "expr",
            ValueSource::Memory => "memory",
            ValueSource::Other(s) => s,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

static WS_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Tooltip → plain text. Accepts a string or a `{binding}` object; exports
/// sometimes carry literal `=` sequences and ragged whitespace.
fn normalize_tooltip(v: &Value) -> Option<String> {
    let raw = match v {
        Value::String(s) => s.clone(),
        Value::Object(m) => m.get("binding").and_then(Value::as_str).unwrap_or("").to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    let cleaned = raw.replace("\\u003d", "=");
    let cleaned = WS_RUN.replace_all(cleaned.trim(), " ").into_owned();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
