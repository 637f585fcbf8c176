//! Error taxonomy for one record conversion.
//!
//! Only two conditions are fatal for a record: failing to read/parse the
//! input, and failing to write the output. Everything else (bad node, missing
//! type reference, unknown data type) degrades to a warning collected on the
//! per-record [`Report`] and the record still converts.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path} (at {json_path}): {message}")]
    Parse {
        path: PathBuf,
        json_path: String,
        message: String,
    },

    #[error("record in {path} has no usable tags")]
    EmptyRecord { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Accumulator for non-fatal findings while processing one record or corpus.
#[derive(Debug, Default, Clone)]
pub struct Report {
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.infos.push(msg.into());
    }

    /// Fold another report's findings into this one.
    pub fn absorb(&mut self, other: Report) {
        self.warnings.extend(other.warnings);
        self.infos.extend(other.infos);
    }
}
