//! TwinCAT struct declaration emitter (format-B).
//!
//! Turns a classified entry list into a `TYPE ... STRUCT` declaration with
//! OPC UA pragmas per member, then wraps it in the `.TcDUT` XML envelope the
//! TwinCAT project importer expects. Cosmetic layout knobs are named
//! constants up top, kept apart from the mapping/classification semantics.

use uuid::Uuid;

use crate::classify::Entry;
use crate::error::Report;
use crate::mapping::{default_literal, map_type};
use crate::names::sanitize_identifier;

// ————————————————————————————————————————————————————————————————————————————
// LAYOUT KNOBS (cosmetic only)
// ————————————————————————————————————————————————————————————————————————————

/// A blank line before every Nth entry, for readability. `None` disables.
const BLANK_LINE_EVERY: Option<usize> = Some(5);

/// Inline description comments are truncated beyond this many characters.
const DESC_COMMENT_MAX: usize = 70;

const INDENT: &str = "    ";
const MEMBER_INDENT: &str = "        ";

// ————————————————————————————————————————————————————————————————————————————
// DECLARATION
// ————————————————————————————————————————————————————————————————————————————

/// Emit the struct declaration body for one record.
///
/// `generated_on` is the human-readable timestamp for the header comment;
/// the driver passes wall-clock time, tests pass a fixed string.
pub fn emit_struct(
    struct_name: &str,
    source_name: &str,
    entries: &[Entry],
    generated_on: &str,
    report: &mut Report,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    // Struct-level pragmas: packed layout, whole struct exposed over OPC UA.
    lines.push(format!("{INDENT}{{attribute 'pack_mode' := '1'}}"));
    lines.push(format!("{INDENT}{{attribute 'OPC.UA.DA' := '1'}}"));
    lines.push(format!("{INDENT}{{attribute 'OPC.UA.DA.StructuredType' := '1'}}"));
    lines.push(format!("{INDENT}(*"));
    lines.push(format!("{INDENT}{struct_name}"));
    lines.push(format!("{INDENT}{}", "=".repeat(50)));
    lines.push(format!("{INDENT}Generated from Ignition UDT: {source_name}"));
    lines.push(format!("{INDENT}Total entries: {}", entries.len()));
    lines.push(format!("{INDENT}Generated on: {generated_on}"));
    lines.push(format!("{INDENT}*)"));
    lines.push(format!("{INDENT}TYPE {struct_name} :"));
    lines.push(format!("{INDENT}STRUCT"));

    for (i, entry) in entries.iter().enumerate() {
        if let Some(n) = BLANK_LINE_EVERY {
            if i > 0 && i % n == 0 {
                lines.push(String::new());
            }
        }
        match entry {
            Entry::Instance { name, type_id, target_type } => {
                let ident = sanitize_identifier(name);
                lines.push(format!(
                    "{MEMBER_INDENT}{ident} : {target_type};\t\t// UDT instance of {type_id}"
                ));
            }
            Entry::Tag { tag, folder_path } => {
                emit_tag_block(&mut lines, tag, folder_path.as_deref(), report);
            }
        }
    }

    lines.push(format!("{INDENT}END_STRUCT"));
    lines.push(format!("{INDENT}END_TYPE"));

    lines.join("\n")
}

fn emit_tag_block(
    lines: &mut Vec<String>,
    tag: &crate::model::AtomicTag,
    folder_path: Option<&str>,
    report: &mut Report,
) {
    // OPC UA pragmas: exposure always, access restriction when read-only,
    // description when we have one (embedded quotes doubled for escaping).
    lines.push(format!("{MEMBER_INDENT}{{attribute 'OPC.UA.DA' := '1'}}"));
    if tag.read_only {
        lines.push(format!("{MEMBER_INDENT}{{attribute 'OPC.UA.DA.Access' := '1'}}"));
    }
    if let Some(desc) = &tag.description {
        let escaped = desc.replace('\'', "''");
        lines.push(format!(
            "{MEMBER_INDENT}{{attribute 'OPC.UA.DA.Description' := '{escaped}'}}"
        ));
    }

    // Echo the description as a comment too, but only for top-level tags;
    // folder members would drown in repetition.
    if folder_path.is_none() {
        if let Some(desc) = &tag.description {
            lines.push(format!("{MEMBER_INDENT}// {}", truncate(desc, DESC_COMMENT_MAX)));
        }
    }

    let ident = sanitize_identifier(&tag.name);
    let (twincat_type, matched) = map_type(&tag.data_type);
    if !matched {
        report.warn(format!(
            "tag '{}': unknown data type '{}', emitted as-is",
            tag.name, tag.data_type
        ));
    }

    let mut decl = format!("{MEMBER_INDENT}{ident} : {twincat_type}");
    if matched {
        if let Some(default) = default_literal(&twincat_type) {
            decl.push_str(&format!(" := {default}"));
        }
    }
    decl.push(';');

    if tag.read_only {
        decl.push_str("\t\t// Read-only tag");
    }
    if let Some(path) = folder_path {
        decl.push_str(&format!("\t\t// Folder: {path}"));
    }
    lines.push(decl);
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

// ————————————————————————————————————————————————————————————————————————————
// ENVELOPE
// ————————————————————————————————————————————————————————————————————————————

/// Wrap a declaration in the `.TcDUT` XML container with a fresh GUID.
pub fn emit_envelope(struct_name: &str, declaration: &str) -> String {
    let dut_id = Uuid::new_v4();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <TcPlcObject Version=\"1.1.0.1\">\n\
         \x20\x20<DUT Name=\"{struct_name}\" Id=\"{{{dut_id}}}\">\n\
         \x20\x20\x20\x20<Declaration><![CDATA[{declaration}\n\
         ]]></Declaration>\n\
         \x20\x20</DUT>\n\
         </TcPlcObject>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::resolver::TypeRefMap;
    use serde_json::json;

    const TS: &str = "2025-09-01 12:00:00";

    fn entries_of(v: serde_json::Value, refs: &TypeRefMap) -> Vec<Entry> {
        let mut report = Report::new();
        let record = Record::from_value(v, &mut report).unwrap();
        crate::classify::classify(&record.nodes, refs, &mut report)
    }

    fn emit(v: serde_json::Value) -> String {
        let entries = entries_of(v, &TypeRefMap::new());
        let mut report = Report::new();
        emit_struct("ST_Test_HMI_IgnitionExp", "RW_Test", &entries, TS, &mut report)
    }

    #[test]
    fn header_and_footer_frame_the_declaration() {
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "a", "dataType": "Boolean"},
        ]}));
        assert!(out.contains("{attribute 'pack_mode' := '1'}"));
        assert!(out.contains("TYPE ST_Test_HMI_IgnitionExp :"));
        assert!(out.contains("Generated from Ignition UDT: RW_Test"));
        assert!(out.contains("Generated on: 2025-09-01 12:00:00"));
        assert!(out.trim_end().ends_with("END_TYPE"));
    }

    #[test]
    fn scalar_defaults_per_type_family() {
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "b", "dataType": "Boolean"},
            {"name": "f", "dataType": "Float"},
            {"name": "i", "dataType": "Integer"},
            {"name": "s", "dataType": "String"},
            {"name": "t", "dataType": "DateTime"},
            {"name": "arr", "dataType": "Float Array"},
        ]}));
        assert!(out.contains("b : BOOL := FALSE;"));
        assert!(out.contains("f : REAL := 0.0;"));
        assert!(out.contains("i : DINT := 0;"));
        assert!(out.contains("s : STRING := '';"));
        assert!(out.contains("t : DT := DT#1970-01-01-00:00:00;"));
        assert!(out.contains("arr : ARRAY[0..255] OF REAL;"));
    }

    #[test]
    fn unknown_type_emits_as_is_without_default_and_warns() {
        let entries = entries_of(
            json!({"name": "RW_Test", "tags": [{"name": "doc", "dataType": "Document"}]}),
            &TypeRefMap::new(),
        );
        let mut report = Report::new();
        let out = emit_struct("ST_X", "RW_Test", &entries, TS, &mut report);
        assert!(out.contains("doc : Document;"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn readonly_tag_gets_access_pragma_and_trailing_comment() {
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "sts", "dataType": "Integer", "readOnly": true},
        ]}));
        assert!(out.contains("{attribute 'OPC.UA.DA.Access' := '1'}"));
        assert!(out.contains("sts : DINT := 0;\t\t// Read-only tag"));
    }

    #[test]
    fn description_pragma_doubles_embedded_quotes() {
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "pv", "dataType": "Float", "tooltip": "it's the PV"},
        ]}));
        assert!(out.contains("{attribute 'OPC.UA.DA.Description' := 'it''s the PV'}"));
        assert!(out.contains("// it's the PV"));
    }

    #[test]
    fn folder_members_carry_path_comment_but_no_echo() {
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "A", "tagType": "Folder", "tags": [
                {"name": "B", "tagType": "Folder", "tags": [
                    {"name": "x", "dataType": "Float", "tooltip": "inner"},
                ]},
            ]},
        ]}));
        assert!(out.contains("x : REAL := 0.0;\t\t// Folder: A_B"));
        // pragma still carries the description, the echo comment does not
        assert!(out.contains("{attribute 'OPC.UA.DA.Description' := 'inner'}"));
        assert!(!out.contains("// inner"));
        // folders themselves declare nothing
        assert!(!out.contains("A :"));
        assert!(!out.contains("B :"));
    }

    #[test]
    fn instance_entry_declares_resolved_type() {
        let mut report = Report::new();
        let mut refs = TypeRefMap::new();
        refs.insert("RW_Alarm_Basic", &mut report);
        let entries = entries_of(
            json!({"name": "RW_Test", "tags": [
                {"name": "alm", "tagType": "UdtInstance", "typeId": "RW_Standard/RW_Alarm_Basic"},
            ]}),
            &refs,
        );
        let out = emit_struct("ST_X", "RW_Test", &entries, TS, &mut report);
        assert!(out.contains(
            "alm : ST_RW_AlarmBasic_HMI_IgnitionExp;\t\t// UDT instance of RW_Standard/RW_Alarm_Basic"
        ));
    }

    #[test]
    fn long_description_truncates_with_ellipsis() {
        let long = "x".repeat(100);
        let out = emit(json!({"name": "RW_Test", "tags": [
            {"name": "pv", "dataType": "Float", "tooltip": long},
        ]}));
        let expected = format!("// {}...", "x".repeat(DESC_COMMENT_MAX - 3));
        assert!(out.contains(&expected));
    }

    #[test]
    fn blank_line_inserted_before_every_fifth_entry() {
        let tags: Vec<_> = (0..7)
            .map(|i| json!({"name": format!("t{i}"), "dataType": "Boolean"}))
            .collect();
        let out = emit(json!({"name": "RW_Test", "tags": tags}));
        let lines: Vec<&str> = out.lines().collect();
        let t5_decl = lines.iter().position(|l| l.contains("t5 : BOOL")).unwrap();
        // the blank separator sits just above t5's pragma line
        assert_eq!(lines[t5_decl - 2], "");
    }

    #[test]
    fn envelope_wraps_declaration_with_guid() {
        let xml = emit_envelope("ST_X", "    TYPE ST_X :");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<TcPlcObject Version=\"1.1.0.1\">"));
        assert!(xml.contains("<DUT Name=\"ST_X\" Id=\"{"));
        assert!(xml.contains("<![CDATA[    TYPE ST_X :"));
        assert!(xml.ends_with("</TcPlcObject>"));
    }
}
