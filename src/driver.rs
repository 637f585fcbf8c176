//! Conversion driver: load → transform → emit → persist, one record at a time.
//!
//! Per-node problems never escape this boundary; they accumulate as warnings
//! on the per-record [`Outcome`]. Only an unreadable/unparseable input or an
//! unwritable destination fails a record, and even that fails only *that*
//! record within a batch. Batches build the corpus [`TypeRefMap`] fully
//! before any per-record work and then fan out over `rayon`; the map is
//! immutable shared state from that point on.

use std::path::{Path, PathBuf};

use chrono::Local;
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use crate::classify::classify;
use crate::emit::{emit_envelope, emit_struct};
use crate::error::{ConvertError, Report};
use crate::model::Record;
use crate::names::to_target_struct_name;
use crate::remap::{remap_record, RemapStats};
use crate::resolver::TypeRefMap;
use crate::versions::{select_latest, version_priority};

// ————————————————————————————————————————————————————————————————————————————
// OUTCOMES
// ————————————————————————————————————————————————————————————————————————————

/// Structured result of one record conversion.
#[derive(Debug)]
pub struct Outcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Format-A mutation counters (zeroed in struct mode).
    pub stats: RemapStats,
    /// Entries emitted into the struct declaration (zero in remap mode).
    pub entries: usize,
    pub report: Report,
    pub error: Option<String>,
    /// Converted record value, kept only when a batch needs to bundle it.
    bundle_value: Option<Value>,
}

impl Outcome {
    fn new(input: PathBuf) -> Self {
        Outcome {
            input,
            output: None,
            stats: RemapStats::default(),
            entries: 0,
            report: Report::new(),
            error: None,
            bundle_value: None,
        }
    }

    fn failed(mut self, err: ConvertError) -> Self {
        self.error = Some(err.to_string());
        self
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<Outcome>,
}

impl BatchSummary {
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.ok())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SINGLE-RECORD CONVERSIONS
// ————————————————————————————————————————————————————————————————————————————

fn load_record(path: &Path) -> Result<(Record, Report), ConvertError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value =
        crate::path_de::from_str_with_path(&source).map_err(|(json_path, message)| {
            ConvertError::Parse {
                path: path.to_path_buf(),
                json_path,
                message,
            }
        })?;
    let mut report = Report::new();
    let record = Record::from_value(value, &mut report).ok_or_else(|| ConvertError::Parse {
        path: path.to_path_buf(),
        json_path: ".".to_string(),
        message: "top-level value is not a record object".to_string(),
    })?;
    Ok((record, report))
}

fn write_text(path: &Path, text: &str) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConvertError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    std::fs::write(path, text).map_err(|source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Default format-A output path: `<stem>_Beckhoff.json` next to the input.
fn default_remap_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("converted");
    input.with_file_name(format!("{stem}_Beckhoff.json"))
}

/// Format-A: remap one record and write it back out as JSON.
pub fn convert_remap(input: &Path, output: Option<PathBuf>, keep_value: bool) -> Outcome {
    let mut outcome = Outcome::new(input.to_path_buf());

    let (mut record, report) = match load_record(input) {
        Ok(x) => x,
        Err(e) => return outcome.failed(e),
    };
    outcome.report.absorb(report);

    outcome.stats = remap_record(&mut record);
    let value = record.to_value();
    let text = match serde_json::to_string_pretty(&value) {
        Ok(s) => s,
        Err(e) => {
            return outcome.failed(ConvertError::Parse {
                path: input.to_path_buf(),
                json_path: ".".to_string(),
                message: e.to_string(),
            });
        }
    };

    let out_path = output.unwrap_or_else(|| default_remap_output(input));
    if let Err(e) = write_text(&out_path, &text) {
        return outcome.failed(e);
    }

    outcome.output = Some(out_path);
    if keep_value {
        outcome.bundle_value = Some(value);
    }
    outcome
}

/// Format-B: classify one record against the shared reference table and
/// write `<TargetStructName>.TcDUT` into `out_dir`.
pub fn convert_struct(input: &Path, out_dir: &Path, refs: &TypeRefMap) -> Outcome {
    let mut outcome = Outcome::new(input.to_path_buf());

    let (record, report) = match load_record(input) {
        Ok(x) => x,
        Err(e) => return outcome.failed(e),
    };
    outcome.report.absorb(report);

    let entries = classify(&record.nodes, refs, &mut outcome.report);
    if entries.is_empty() {
        return outcome.failed(ConvertError::EmptyRecord {
            path: input.to_path_buf(),
        });
    }
    outcome.entries = entries.len();

    let struct_name = to_target_struct_name(&record.name);
    let generated_on = timestamp_now();
    let declaration = emit_struct(
        &struct_name,
        &record.name,
        &entries,
        &generated_on,
        &mut outcome.report,
    );
    let xml = emit_envelope(&struct_name, &declaration);

    let out_path = out_dir.join(format!("{struct_name}.TcDUT"));
    if let Err(e) = write_text(&out_path, &xml) {
        return outcome.failed(e);
    }
    outcome.output = Some(out_path);
    outcome
}

// ————————————————————————————————————————————————————————————————————————————
// BATCH
// ————————————————————————————————————————————————————————————————————————————

/// Non-recursive `*.json` listing, sorted for deterministic batch order.
pub fn corpus_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = dir.join("*.json");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .collect();
    files.sort();
    Ok(files)
}

pub fn batch_remap(
    source_dir: &Path,
    out_dir: Option<&Path>,
    bundle: Option<&Path>,
) -> anyhow::Result<BatchSummary> {
    let files = corpus_files(source_dir)?;
    let want_bundle = bundle.is_some();

    let outcomes: Vec<Outcome> = files
        .par_iter()
        .map(|input| {
            let output = out_dir.map(|d| {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("converted");
                d.join(format!("{stem}_Beckhoff.json"))
            });
            convert_remap(input, output, want_bundle)
        })
        .collect();

    let mut summary = BatchSummary { outcomes };

    // Corpus-level import bundle: every converted record under one `tags` array.
    if let Some(bundle_path) = bundle {
        let tags: Vec<Value> = summary
            .outcomes
            .iter_mut()
            .filter_map(|o| o.bundle_value.take())
            .collect();
        let combined = serde_json::json!({ "tags": tags });
        let text = serde_json::to_string_pretty(&combined)?;
        write_text(bundle_path, &text).map_err(anyhow::Error::from)?;
    }

    Ok(summary)
}

pub fn batch_struct(source_dir: &Path, out_dir: &Path) -> anyhow::Result<BatchSummary> {
    let files = corpus_files(source_dir)?;

    // Reference table first, fully built, then treated as immutable.
    let mut corpus_report = Report::new();
    let refs = TypeRefMap::scan_dir(source_dir, &mut corpus_report);

    // Several revisions of one UDT derive the same struct name and would
    // race for the same output path; exactly one revision per derived name
    // converts, picked by the same priority rule `extract` uses. Files
    // whose name cannot be read still convert (and fail with their own
    // per-record error).
    let mut by_target: indexmap::IndexMap<String, Vec<(String, i64, PathBuf)>> =
        indexmap::IndexMap::new();
    let mut inputs: Vec<PathBuf> = Vec::new();
    for path in files {
        match peek_record_name(&path) {
            Some(name) => {
                let target = to_target_struct_name(&name);
                let priority = version_priority(&name);
                by_target.entry(target).or_default().push((name, priority, path));
            }
            None => inputs.push(path),
        }
    }
    for (target, mut members) in by_target {
        members.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
        let (winner, _, path) = members.pop().expect("non-empty group");
        for (loser, _, _) in &members {
            corpus_report.warn(format!(
                "skipping '{loser}': derives the same struct '{target}' as newer revision '{winner}'"
            ));
        }
        inputs.push(path);
    }
    inputs.sort();

    for warning in &corpus_report.warnings {
        eprintln!("{} {warning}", "warning:".yellow());
    }
    println!("reference table: {} type id(s) from {}", refs.len(), source_dir.display());

    let outcomes: Vec<Outcome> = inputs
        .par_iter()
        .map(|input| convert_struct(input, out_dir, &refs))
        .collect();

    Ok(BatchSummary { outcomes })
}

/// Top-level `name` of a record file, or `None` if unreadable/unparseable.
fn peek_record_name(path: &Path) -> Option<String> {
    let source = std::fs::read_to_string(path).ok()?;
    let value: Value = serde_json::from_str(&source).ok()?;
    value.get("name").and_then(Value::as_str).map(str::to_string)
}

/// Print per-file lines plus a final summary enumerating every failure.
pub fn print_batch_summary(summary: &BatchSummary) {
    let mut totals = RemapStats::default();
    let mut total_entries = 0usize;

    for outcome in &summary.outcomes {
        totals.merge(&outcome.stats);
        total_entries += outcome.entries;
        let name = outcome
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| outcome.input.display().to_string());
        match &outcome.error {
            None => {
                let dest = outcome
                    .output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("{} {name} -> {dest}", "ok".green());
            }
            Some(err) => println!("{} {name}: {err}", "FAILED".red()),
        }
        for warning in &outcome.report.warnings {
            println!("    {} {warning}", "warning:".yellow());
        }
    }

    let total = summary.outcomes.len();
    let failed = summary.failed_count();
    println!();
    println!("{total} file(s) processed, {} succeeded, {failed} failed", total - failed);
    if totals.bindings_rewritten + totals.parameters_updated > 0 {
        println!(
            "{} binding(s) rewritten, {} parameter set(s) updated, {} tag(s) skipped",
            totals.bindings_rewritten, totals.parameters_updated, totals.tags_skipped,
        );
    }
    if total_entries > 0 {
        println!("{total_entries} struct member(s) emitted");
    }
    if failed > 0 {
        for outcome in summary.failures() {
            println!(
                "  {} {}: {}",
                "FAILED".red(),
                outcome.input.display(),
                outcome.error.as_deref().unwrap_or("unknown error"),
            );
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CORPUS EXTRACTION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub total_in_source: usize,
    pub groups: usize,
    pub extracted: usize,
    pub report_path: Option<PathBuf>,
}

/// Split one combined export into per-record files, keeping only the latest
/// revision of each logical UDT, plus a human-readable extraction report.
pub fn extract(big_export: &Path, out_dir: &Path) -> anyhow::Result<ExtractSummary> {
    // The combined export is a container whose `tags` entries are whole
    // records; keep them as raw values so they write back out verbatim.
    let source = std::fs::read_to_string(big_export)?;
    let value: Value = serde_json::from_str(&source)?;
    let mut report = Report::new();

    let raw_tags = value
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("{}: expected a top-level 'tags' array", big_export.display()))?;
    let total_in_source = raw_tags.len();

    let mut candidates: Vec<(String, Value)> = Vec::new();
    for (i, udt) in raw_tags.iter().enumerate() {
        let Some(obj) = udt.as_object() else {
            report.warn(format!("entry {i} is not an object, skipped"));
            continue;
        };
        match obj.get("name").and_then(Value::as_str) {
            Some(name) => candidates.push((name.to_string(), udt.clone())),
            None => report.warn(format!("entry {i} has no 'name', skipped")),
        }
    }

    let selection = select_latest(candidates, &mut report);

    std::fs::create_dir_all(out_dir)?;
    let mut written: Vec<String> = Vec::new();
    for (name, data) in &selection.winners {
        let path = out_dir.join(format!("{name}.json"));
        let text = serde_json::to_string_pretty(data)?;
        write_text(&path, &text).map_err(anyhow::Error::from)?;
        written.push(format!("{name}.json"));
    }
    written.sort();

    let report_path = out_dir.join("extraction_report.txt");
    let report_text = render_extraction_report(
        big_export,
        total_in_source,
        &selection,
        &written,
        &timestamp_now(),
    );
    std::fs::write(&report_path, report_text)?;

    for warning in &report.warnings {
        eprintln!("{} {warning}", "warning:".yellow());
    }
    for info in &report.infos {
        eprintln!("{info}");
    }

    Ok(ExtractSummary {
        total_in_source,
        groups: selection.groups.len(),
        extracted: selection.winners.len(),
        report_path: Some(report_path),
    })
}

fn render_extraction_report(
    source: &Path,
    total: usize,
    selection: &crate::versions::Selection,
    written: &[String],
    generated_on: &str,
) -> String {
    let mut out = String::new();
    out.push_str("UDT Extraction Report\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    out.push_str(&format!("Generated on: {generated_on}\n"));
    out.push_str(&format!("Source file: {}\n", source.display()));
    out.push_str(&format!("Total UDTs in source: {total}\n"));
    out.push_str(&format!("UDT groups processed: {}\n", selection.groups.len()));
    out.push_str(&format!("UDTs extracted: {}\n\n", selection.winners.len()));

    out.push_str("EXTRACTED UDTs (Latest Versions Only):\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    let mut names: Vec<&String> = selection.winners.keys().collect();
    names.sort();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }

    out.push_str("\nVERSION SELECTION DETAILS:\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    let mut groups = selection.groups.clone();
    groups.sort_by(|a, b| a.base.cmp(&b.base));
    for group in &groups {
        if group.candidates.len() > 1 {
            out.push_str(&format!("\nBase: {}\n", group.base));
            out.push_str("  Available versions:\n");
            let mut candidates = group.candidates.clone();
            candidates.sort_by(|a, b| (-a.1, &a.0).cmp(&(-b.1, &b.0)));
            for (name, priority) in &candidates {
                let status = if *name == group.winner { "SELECTED" } else { "skipped" };
                out.push_str(&format!("    {name} (priority: {priority}) {status}\n"));
            }
        } else {
            out.push_str(&format!("{}: {} (single version)\n", group.base, group.winner));
        }
    }

    out.push_str("\nFILES CREATED:\n");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for file in written {
        out.push_str(file);
        out.push('\n');
    }

    out
}

fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Fresh scratch directory under the system temp dir.
    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tagbridge-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_json(dir: &Path, name: &str, v: Value) {
        std::fs::write(dir.join(name), serde_json::to_string_pretty(&v).unwrap()).unwrap();
    }

    fn sample_record(name: &str) -> Value {
        json!({
            "name": name,
            "parameters": {"Node": {"dataType": "String", "value": "plc1"}},
            "tags": [{
                "name": "PV",
                "dataType": "Float",
                "valueSource": "opc",
                "opcServer": "Kepware OPC UA",
                "opcItemPath": {"binding": "KEPServerEX.{Node}.PV_Scaled"}
            }]
        })
    }

    #[test]
    fn remap_writes_default_output_with_suffix() {
        let dir = scratch();
        write_json(&dir, "RW_Analog_In.json", sample_record("RW_Analog_In"));

        let outcome = convert_remap(&dir.join("RW_Analog_In.json"), None, false);
        assert!(outcome.ok(), "{:?}", outcome.error);
        let out = dir.join("RW_Analog_In_Beckhoff.json");
        assert_eq!(outcome.output.as_deref(), Some(out.as_path()));

        let text = std::fs::read_to_string(out).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["parameters"]["OPCServer"]["value"], json!("Beckhoff@YourComputerName"));
        assert_eq!(v["tags"][0]["opcItemPath"]["binding"], json!("{OPCTagPath}.hmiIgnition.PV_Scaled"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn struct_mode_names_file_after_target_struct() {
        let dir = scratch();
        let out_dir = dir.join("structs");
        write_json(&dir, "RW_Analog_In.json", sample_record("RW_Analog_In"));

        let refs = TypeRefMap::new();
        let outcome = convert_struct(&dir.join("RW_Analog_In.json"), &out_dir, &refs);
        assert!(outcome.ok(), "{:?}", outcome.error);
        assert_eq!(outcome.entries, 1);

        let out = out_dir.join("ST_RW_AnalogIn_HMI_IgnitionExp.TcDUT");
        let xml = std::fs::read_to_string(out).unwrap();
        assert!(xml.contains("TYPE ST_RW_AnalogIn_HMI_IgnitionExp :"));
        assert!(xml.contains("PV : REAL := 0.0;"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unreadable_input_fails_only_that_record() {
        let dir = scratch();
        write_json(&dir, "good.json", sample_record("RW_Good_One"));
        std::fs::write(dir.join("bad.json"), "{not json").unwrap();

        let summary = batch_struct(&dir, &dir.join("out")).unwrap();
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.failed_count(), 1);
        let failed = summary.failures().next().unwrap();
        assert!(failed.input.ends_with("bad.json"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn colliding_revisions_emit_one_struct_from_the_newest() {
        let dir = scratch();
        write_json(&dir, "RW_Digital_Out.json", sample_record("RW_Digital_Out"));
        write_json(&dir, "RW_Digital_Out_V2.json", sample_record("RW_Digital_Out_V2"));

        let out_dir = dir.join("out");
        let summary = batch_struct(&dir, &out_dir).unwrap();
        assert_eq!(summary.failed_count(), 0);
        // Both revisions derive ST_RW_DigitalOut_HMI_IgnitionExp; only the
        // numbered revision converts.
        assert_eq!(summary.outcomes.len(), 1);
        assert!(summary.outcomes[0].input.ends_with("RW_Digital_Out_V2.json"));

        let xml =
            std::fs::read_to_string(out_dir.join("ST_RW_DigitalOut_HMI_IgnitionExp.TcDUT")).unwrap();
        assert!(xml.contains("Generated from Ignition UDT: RW_Digital_Out_V2"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn empty_record_is_a_per_record_failure_in_struct_mode() {
        let dir = scratch();
        write_json(&dir, "empty.json", json!({"name": "RW_Empty_One", "tags": []}));
        let outcome = convert_struct(&dir.join("empty.json"), &dir.join("out"), &TypeRefMap::new());
        assert!(!outcome.ok());
        assert!(outcome.error.as_ref().unwrap().contains("no usable tags"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn bundle_collects_every_converted_record() {
        let dir = scratch();
        write_json(&dir, "a.json", sample_record("RW_Aaa_In"));
        write_json(&dir, "b.json", sample_record("RW_Bbb_Out"));
        let bundle = dir.join("bundle").join("combined.json");

        let summary = batch_remap(&dir, Some(&dir.join("out")), Some(&bundle)).unwrap();
        assert_eq!(summary.failed_count(), 0);

        let v: Value = serde_json::from_str(&std::fs::read_to_string(bundle).unwrap()).unwrap();
        let tags = v["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 2);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn extract_dedupes_and_writes_report() {
        let dir = scratch();
        let big = dir.join("big.json");
        let combined = json!({
            "name": "export",
            "tags": [
                sample_record("RW_Sensor"),
                sample_record("RW_Sensor_V2"),
                sample_record("RW_Sensor_TEST"),
                sample_record("Sim_Ignored"),
            ]
        });
        std::fs::write(&big, serde_json::to_string_pretty(&combined).unwrap()).unwrap();

        let out_dir = dir.join("extracted");
        let summary = extract(&big, &out_dir).unwrap();
        assert_eq!(summary.total_in_source, 4);
        assert_eq!(summary.extracted, 1);
        assert!(out_dir.join("RW_Sensor_V2.json").exists());
        assert!(!out_dir.join("RW_Sensor.json").exists());

        let report = std::fs::read_to_string(out_dir.join("extraction_report.txt")).unwrap();
        assert!(report.contains("RW_Sensor_V2 (priority: 1002) SELECTED"));
        assert!(report.contains("RW_Sensor_TEST (priority: 0) skipped"));
        std::fs::remove_dir_all(dir).ok();
    }
}
