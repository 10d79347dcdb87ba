//! Query input and temporary staging.
//!
//! BLAST+ reads queries from a file. In-memory text and gzip-compressed files
//! are written to a temporary FASTA file that lives exactly as long as the
//! returned [`StagedQuery`]; plain files are passed through untouched.

use std::io::{BufRead, Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{BlastError, Result};
use crate::seqio::{self, FastaReader};

/// Sequences to search with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// FASTA text held in memory.
    Text(String),
    /// Path to a FASTA file (optionally `.gz`).
    File(PathBuf),
}

impl Query {
    pub fn text(fasta: impl Into<String>) -> Self {
        Query::Text(fasta.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Query::File(path.into())
    }

    /// Full FASTA text of the query, reading the file if needed.
    pub fn load_text(&self) -> Result<String> {
        match self {
            Query::Text(text) => Ok(text.clone()),
            Query::File(path) => {
                seqio::read_to_string(path).map_err(|e| not_utf8_as_invalid(e, path))
            }
        }
    }

    /// Checks the query and makes it available as a file on disk.
    pub fn stage(&self) -> Result<StagedQuery> {
        match self {
            Query::Text(text) => {
                validate_fasta_text(text)?;
                StagedQuery::write_temp(text)
            }
            Query::File(path) if seqio::is_gzip_path(path) => {
                let text = self.load_text()?;
                validate_fasta_text(&text)?;
                StagedQuery::write_temp(&text)
            }
            Query::File(path) => {
                validate_fasta_file(path)?;
                Ok(StagedQuery::Existing(path.clone()))
            }
        }
    }
}

/// A query available on disk; the temporary variant is deleted on drop.
#[derive(Debug)]
pub enum StagedQuery {
    Existing(PathBuf),
    Temp(NamedTempFile),
}

impl StagedQuery {
    fn write_temp(text: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("blastrun_query_")
            .suffix(".fasta")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;

        // Shared read-only by every invocation of a multi-database search.
        #[cfg(unix)]
        {
            let mut perms = file.as_file().metadata()?.permissions();
            perms.set_readonly(true);
            std::fs::set_permissions(file.path(), perms)?;
        }

        log::debug!("Staged query at {}", file.path().display());
        Ok(StagedQuery::Temp(file))
    }

    pub fn path(&self) -> &Path {
        match self {
            StagedQuery::Existing(path) => path,
            StagedQuery::Temp(file) => file.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, StagedQuery::Temp(_))
    }
}

/// Rejects empty text, text without a header, and records without residues.
pub fn validate_fasta_text(text: &str) -> Result<()> {
    validate_fasta(Cursor::new(text.as_bytes()), "query")
}

/// Applies the same checks as [`validate_fasta_text`] to a file on disk.
fn validate_fasta_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(BlastError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let what = format!("query file {}", path.display());
    validate_fasta(seqio::open_reader(path)?, &what).map_err(|e| not_utf8_as_invalid(e, path))
}

fn validate_fasta<R: BufRead>(mut reader: R, what: &str) -> Result<()> {
    // First non-blank byte must open a header.
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Err(BlastError::invalid_input(format!("{} is empty", what)));
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => {
                let first = buf[i];
                reader.consume(i);
                if first != b'>' {
                    return Err(BlastError::invalid_input(format!(
                        "{} is not FASTA: expected first line to start with '>'",
                        what
                    )));
                }
                break;
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    }

    let mut n_records = 0usize;
    for record in FastaReader::new(reader) {
        let record = record?;
        if record.seq.is_empty() {
            return Err(BlastError::invalid_input(format!(
                "{} record '{}' has no sequence",
                what, record.name
            )));
        }
        n_records += 1;
    }
    if n_records == 0 {
        return Err(BlastError::invalid_input(format!("{} contains no FASTA records", what)));
    }
    Ok(())
}

fn not_utf8_as_invalid(err: BlastError, path: &Path) -> BlastError {
    match err {
        BlastError::Io { source } if source.kind() == ErrorKind::InvalidData => {
            BlastError::invalid_input(format!("query file is not UTF-8 text: {}", path.display()))
        }
        other => other,
    }
}
