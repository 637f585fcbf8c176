//! CLI: remap (format-A) | struct (format-B) | extract
use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::driver;
use crate::error::Report;
use crate::resolver::TypeRefMap;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Convert Ignition UDT exports: KEPware→Beckhoff tag remapping, TwinCAT
/// struct generation, and combined-export extraction.
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// remap one UDT JSON from KEPware to Beckhoff addressing (format-A)
    Remap(RemapArgs),
    /// remap every UDT JSON in a directory
    RemapBatch(RemapBatchArgs),
    /// generate a TwinCAT .TcDUT struct from one UDT JSON (format-B)
    Struct(StructArgs),
    /// generate TwinCAT structs for every UDT JSON in a directory
    StructBatch(StructBatchArgs),
    /// split a combined export into per-UDT files, latest revisions only
    Extract(ExtractArgs),
}

#[derive(clap::Args, Debug)]
struct RemapArgs {
    /// input UDT JSON file
    input: PathBuf,

    /// output file (defaults to `<stem>_Beckhoff.json` next to the input)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct RemapBatchArgs {
    /// directory of UDT JSON files
    source_dir: PathBuf,

    /// output directory (defaults to writing next to each input)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// also write a combined import bundle holding every converted record
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// exit zero even when the source directory has no JSON files
    #[arg(long, default_value_t = false)]
    allow_empty: bool,
}

#[derive(clap::Args, Debug)]
struct StructArgs {
    /// input UDT JSON file
    input: PathBuf,

    /// output directory for the .TcDUT file
    #[arg(short, long, default_value = "TwinCAT_Structs")]
    out: PathBuf,

    /// corpus directory for UDT-instance reference resolution
    /// (defaults to the input's directory)
    #[arg(long)]
    refs: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct StructBatchArgs {
    /// directory of UDT JSON files (also the reference-resolution corpus)
    source_dir: PathBuf,

    /// output directory for the .TcDUT files
    #[arg(short, long, default_value = "TwinCAT_Structs")]
    out: PathBuf,

    /// exit zero even when the source directory has no JSON files
    #[arg(long, default_value_t = false)]
    allow_empty: bool,
}

#[derive(clap::Args, Debug)]
struct ExtractArgs {
    /// combined export JSON (one `tags` array of whole UDT records)
    big_export: PathBuf,

    /// output directory for the per-UDT files and the extraction report
    #[arg(short, long)]
    out: PathBuf,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Remap(args) => {
                let outcome = driver::convert_remap(&args.input, args.out.clone(), false);
                finish_single(outcome)
            }
            Command::RemapBatch(args) => {
                let summary = driver::batch_remap(
                    &args.source_dir,
                    args.out.as_deref(),
                    args.bundle.as_deref(),
                )?;
                finish_batch(summary, &args.source_dir, args.allow_empty)
            }
            Command::Struct(args) => {
                let corpus = args
                    .refs
                    .clone()
                    .or_else(|| args.input.parent().map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("."));
                let mut corpus_report = Report::new();
                let refs = TypeRefMap::scan_dir(&corpus, &mut corpus_report);
                print_warnings(&corpus_report);
                if refs.is_empty() {
                    eprintln!(
                        "{} no type references found in {}; UDT instances will be dropped",
                        "warning:".yellow(),
                        corpus.display(),
                    );
                }

                let outcome = driver::convert_struct(&args.input, &args.out, &refs);
                finish_single(outcome)
            }
            Command::StructBatch(args) => {
                let summary = driver::batch_struct(&args.source_dir, &args.out)?;
                finish_batch(summary, &args.source_dir, args.allow_empty)
            }
            Command::Extract(args) => {
                let summary = driver::extract(&args.big_export, &args.out)?;
                println!(
                    "extracted {} of {} UDTs ({} group(s)) into {}",
                    summary.extracted,
                    summary.total_in_source,
                    summary.groups,
                    args.out.display(),
                );
                if let Some(report) = &summary.report_path {
                    println!("extraction report: {}", report.display());
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn print_warnings(report: &Report) {
    for warning in &report.warnings {
        eprintln!("{} {warning}", "warning:".yellow());
    }
}

fn finish_single(outcome: driver::Outcome) -> anyhow::Result<()> {
    print_warnings(&outcome.report);
    match &outcome.error {
        None => {
            if let Some(out) = &outcome.output {
                println!("{} {} -> {}", "ok".green(), outcome.input.display(), out.display());
            }
            Ok(())
        }
        Some(err) => bail!("{err}"),
    }
}

fn finish_batch(
    summary: driver::BatchSummary,
    source_dir: &std::path::Path,
    allow_empty: bool,
) -> anyhow::Result<()> {
    if summary.outcomes.is_empty() {
        if allow_empty {
            println!("no JSON files found in {}", source_dir.display());
            return Ok(());
        }
        bail!("no JSON files found in {}", source_dir.display());
    }

    driver::print_batch_summary(&summary);

    let failed = summary.failed_count();
    if failed > 0 {
        bail!("{failed} file(s) failed to convert");
    }
    Ok(())
}
