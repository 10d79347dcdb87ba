//! Dispatcher configuration and per-call search options.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BlastError, Result};
use crate::invocation::CancelToken;

/// Highest `-outfmt` code understood by BLAST+.
pub const MAX_OUTFMT: u8 = 18;

/// Codes that accept a custom column list.
const COLUMN_FORMATS: [u8; 3] = [6, 7, 10];

/// The `-outfmt` argument: a numeric code and, for the tabular/CSV codes,
/// an optional list of column specifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    code: u8,
    columns: Option<Vec<String>>,
}

impl OutputFormat {
    /// Tab-separated, 12 standard columns.
    pub const TABULAR: u8 = 6;

    pub fn new(code: u8) -> Result<Self> {
        if code > MAX_OUTFMT {
            return Err(BlastError::invalid_input(format!(
                "outfmt must be between 0 and {}, got {}",
                MAX_OUTFMT, code
            )));
        }
        Ok(Self { code, columns: None })
    }

    pub fn with_columns<I, S>(code: u8, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut format = Self::new(code)?;
        if !COLUMN_FORMATS.contains(&code) {
            return Err(BlastError::invalid_input(format!(
                "custom columns can only be used with outfmt 6, 7 and 10, got {}",
                code
            )));
        }
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if let Some(bad) = columns.iter().find(|c| !is_column_name(c)) {
            return Err(BlastError::invalid_input(format!("invalid column name: {:?}", bad)));
        }
        format.columns = Some(columns);
        Ok(format)
    }

    pub fn tabular() -> Self {
        Self {
            code: Self::TABULAR,
            columns: None,
        }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// True when output follows the standard 12-column tab-separated layout.
    pub fn is_standard_tabular(&self) -> bool {
        self.code == Self::TABULAR && self.columns.is_none()
    }

    /// Value passed to `-outfmt` as a single argument.
    pub fn to_arg(&self) -> String {
        match &self.columns {
            Some(columns) if !columns.is_empty() => {
                format!("{} {}", self.code, columns.join(" "))
            }
            _ => self.code.to_string(),
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::tabular()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

fn is_column_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Settings shared by every call made through one dispatcher.
#[derive(Debug, Clone)]
pub struct BlastConfig {
    /// Directory holding the BLAST+ executables; `None` searches `PATH`.
    pub bin_dir: Option<PathBuf>,
    pub outfmt: OutputFormat,
    /// Worker threads for multi-database searches. 0 = one per core, 1 = sequential.
    pub threads: usize,
    /// Kill an invocation that runs longer than this.
    pub timeout: Option<Duration>,
    /// Treat any stderr output from makeblastdb as a failed build.
    pub fail_on_stderr: bool,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            outfmt: OutputFormat::tabular(),
            threads: 0,
            timeout: None,
            fail_on_stderr: true,
        }
    }
}

impl BlastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn outfmt(mut self, outfmt: OutputFormat) -> Self {
        self.outfmt = outfmt;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn fail_on_stderr(mut self, fail: bool) -> Self {
        self.fail_on_stderr = fail;
        self
    }
}

/// Options for a single search call.
///
/// The named fields cover the flags callers commonly set; anything else goes
/// through `extra`, which is validated and forwarded in key order.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub evalue: Option<f64>,
    pub max_target_seqs: Option<u32>,
    pub num_alignments: Option<u32>,
    pub num_threads: Option<u32>,
    pub perc_identity: Option<f64>,
    pub qcov_hsp_perc: Option<f64>,
    pub word_size: Option<u32>,
    /// Scoring matrix name, e.g. `BLOSUM62`. Ignored by blastn.
    pub matrix: Option<String>,
    /// Replaces the dispatcher's output format for this call.
    pub outfmt: Option<OutputFormat>,
    pub extra: BTreeMap<String, String>,
    pub cancel: Option<CancelToken>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evalue(mut self, evalue: f64) -> Self {
        self.evalue = Some(evalue);
        self
    }

    pub fn max_target_seqs(mut self, n: u32) -> Self {
        self.max_target_seqs = Some(n);
        self
    }

    pub fn num_alignments(mut self, n: u32) -> Self {
        self.num_alignments = Some(n);
        self
    }

    pub fn num_threads(mut self, n: u32) -> Self {
        self.num_threads = Some(n);
        self
    }

    pub fn perc_identity(mut self, pct: f64) -> Self {
        self.perc_identity = Some(pct);
        self
    }

    pub fn qcov_hsp_perc(mut self, pct: f64) -> Self {
        self.qcov_hsp_perc = Some(pct);
        self
    }

    pub fn word_size(mut self, n: u32) -> Self {
        self.word_size = Some(n);
        self
    }

    pub fn matrix(mut self, matrix: impl Into<String>) -> Self {
        self.matrix = Some(matrix.into());
        self
    }

    pub fn outfmt(mut self, outfmt: OutputFormat) -> Self {
        self.outfmt = Some(outfmt);
        self
    }

    /// Adds a raw flag; a missing leading dash is added. Setting the same
    /// flag again replaces its value.
    pub fn flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(normalize_key(key.into()), value.into());
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Parses a flag string such as `-evalue 0.01 -matrix=BLOSUM80` into `extra`.
    pub fn parse_flags(flags: &str) -> Result<Self> {
        let mut options = Self::default();
        let tokens: Vec<&str> = flags
            .split(|c: char| c == '=' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() % 2 != 0 {
            return Err(BlastError::invalid_input(format!(
                "one argument is missing a value: {:?}",
                flags
            )));
        }
        for pair in tokens.chunks(2) {
            check_flag(pair[0], pair[1])?;
            let previous = options.extra.insert(pair[0].to_string(), pair[1].to_string());
            if previous.is_some() {
                return Err(BlastError::invalid_input(format!(
                    "{} given more than once",
                    pair[0]
                )));
            }
        }
        Ok(options)
    }

    /// Output format in effect for this call.
    pub fn effective_outfmt<'a>(&'a self, config: &'a BlastConfig) -> &'a OutputFormat {
        self.outfmt.as_ref().unwrap_or(&config.outfmt)
    }

    /// Renders the option flags (excluding `-outfmt`) as argv elements.
    ///
    /// Each flag appears at most once: an `extra` entry naming a flag that a
    /// field already sets, or two entries naming the same flag, is an error.
    pub fn to_args(&self) -> Result<Vec<String>> {
        let mut named: Vec<(&str, String)> = Vec::new();
        if let Some(v) = self.evalue {
            named.push(("-evalue", v.to_string()));
        }
        if let Some(v) = self.max_target_seqs {
            named.push(("-max_target_seqs", v.to_string()));
        }
        if let Some(v) = self.num_alignments {
            named.push(("-num_alignments", v.to_string()));
        }
        if let Some(v) = self.num_threads {
            named.push(("-num_threads", v.to_string()));
        }
        if let Some(v) = self.perc_identity {
            named.push(("-perc_identity", v.to_string()));
        }
        if let Some(v) = self.qcov_hsp_perc {
            named.push(("-qcov_hsp_perc", v.to_string()));
        }
        if let Some(v) = self.word_size {
            named.push(("-word_size", v.to_string()));
        }
        if let Some(v) = &self.matrix {
            check_flag("-matrix", v)?;
            named.push(("-matrix", v.clone()));
        }

        let mut seen: BTreeSet<String> = named.iter().map(|(k, _)| k.to_string()).collect();
        let mut args = Vec::with_capacity(2 * (named.len() + self.extra.len()));
        for (key, value) in named {
            args.push(key.to_string());
            args.push(value);
        }

        for (key, value) in &self.extra {
            let key = normalize_key(key.clone());
            check_flag(&key, value)?;
            if RESERVED_FLAGS.contains(&key.as_str()) {
                return Err(BlastError::invalid_input(format!(
                    "{} is set by the dispatcher and cannot be passed as an extra flag",
                    key
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(BlastError::invalid_input(format!("{} given more than once", key)));
            }
            args.push(key);
            args.push(value.clone());
        }
        Ok(args)
    }
}

const RESERVED_FLAGS: [&str; 3] = ["-outfmt", "-query", "-db"];

fn normalize_key(key: String) -> String {
    if key.starts_with('-') {
        key
    } else {
        format!("-{}", key)
    }
}

/// Keys look like `-evalue`; values are limited to letters, digits, '-' and '.'.
fn check_flag(key: &str, value: &str) -> Result<()> {
    let valid_key = key.len() > 1
        && key.starts_with('-')
        && key[1..].bytes().all(|b| b.is_ascii_lowercase() || b == b'_');
    if !valid_key {
        return Err(BlastError::invalid_input(format!("invalid parameter: {:?}", key)));
    }

    let valid_value = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
    if !valid_value {
        return Err(BlastError::invalid_input(format!(
            "invalid value for {}: {:?}",
            key, value
        )));
    }
    Ok(())
}
