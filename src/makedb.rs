//! BLAST Database Builder
//!
//! Wraps `makeblastdb` to index a FASTA file in place, so the file path can
//! afterwards be used as a database reference, and `blastdbcmd -info` to
//! describe an existing database.
//!
//! # Index Files
//! ```text
//! Type        Extensions written next to the input file
//! nucleotide  .ndb .nhr .nin .not .nsq .ntf .nto
//! protein     .pdb .phr .pin .pot .psq .ptf .pto
//! ```
//! Larger inputs may be split into volumes (`.00.nin`, ...) with an alias
//! file (`.nal`/`.pal`); both layouts are accepted as a built database.
//!
//! Rebuilding overwrites the previous index. A failed build may leave a
//! partial index behind; cleaning it up is left to the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BlastError, Result};
use crate::invocation::Invocation;

const NUCL_EXTENSIONS: [&str; 7] = ["ndb", "nhr", "nin", "not", "nsq", "ntf", "nto"];
const PROT_EXTENSIONS: [&str; 7] = ["pdb", "phr", "pin", "pot", "psq", "ptf", "pto"];

/// Molecule type of a sequence file or database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceType {
    Nucleotide,
    Protein,
}

impl SequenceType {
    /// Value of makeblastdb's `-dbtype`.
    pub fn dbtype(self) -> &'static str {
        match self {
            SequenceType::Nucleotide => "nucl",
            SequenceType::Protein => "prot",
        }
    }

    /// Extensions of a complete single-volume index.
    pub fn index_extensions(self) -> &'static [&'static str] {
        match self {
            SequenceType::Nucleotide => &NUCL_EXTENSIONS,
            SequenceType::Protein => &PROT_EXTENSIONS,
        }
    }

    fn letter(self) -> char {
        match self {
            SequenceType::Nucleotide => 'n',
            SequenceType::Protein => 'p',
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dbtype())
    }
}

impl FromStr for SequenceType {
    type Err = BlastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nucl" | "nucleotide" => Ok(SequenceType::Nucleotide),
            "prot" | "protein" => Ok(SequenceType::Protein),
            _ => Err(BlastError::InvalidSequenceType(s.to_string())),
        }
    }
}

/// Optional makeblastdb settings.
#[derive(Debug, Clone)]
pub struct MakeDbOptions {
    pub title: Option<String>,
    pub taxid: Option<u32>,
    /// Rebuild even when a complete index already exists.
    pub overwrite: bool,
    /// Pass `-parse_seqids` so sequences can be retrieved by identifier.
    pub parse_seqids: bool,
}

impl Default for MakeDbOptions {
    fn default() -> Self {
        Self {
            title: None,
            taxid: None,
            overwrite: true,
            parse_seqids: false,
        }
    }
}

/// Appends `.ext` to the full file name (`db.fna` -> `db.fna.nin`).
fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Index files a build of `file` produces.
pub fn index_files(file: &Path, seq_type: SequenceType) -> Vec<PathBuf> {
    seq_type
        .index_extensions()
        .iter()
        .map(|ext| with_suffix(file, ext))
        .collect()
}

/// True if a complete single-volume index exists for `file`.
pub fn index_complete(file: &Path, seq_type: SequenceType) -> bool {
    index_files(file, seq_type).iter().all(|p| p.is_file())
}

/// True if `db` can be opened as a database of the given type.
pub fn index_exists(db: &Path, seq_type: SequenceType) -> bool {
    let l = seq_type.letter();
    [format!("{l}in"), format!("{l}al"), format!("00.{l}in")]
        .iter()
        .any(|ext| with_suffix(db, ext).is_file())
}

/// Runs makeblastdb and blastdbcmd.
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    makeblastdb: PathBuf,
    blastdbcmd: Option<PathBuf>,
    timeout: Option<Duration>,
    fail_on_stderr: bool,
}

impl DatabaseBuilder {
    pub fn new(makeblastdb: impl Into<PathBuf>) -> Self {
        Self {
            makeblastdb: makeblastdb.into(),
            blastdbcmd: None,
            timeout: None,
            fail_on_stderr: true,
        }
    }

    pub fn blastdbcmd(mut self, path: Option<PathBuf>) -> Self {
        self.blastdbcmd = path;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fail_on_stderr(mut self, fail: bool) -> Self {
        self.fail_on_stderr = fail;
        self
    }

    /// Builds an index for `file`; `seq_type` must be `nucl` or `prot`.
    ///
    /// The type tag is checked before anything touches the filesystem.
    pub fn build(&self, file: &Path, seq_type: &str, options: &MakeDbOptions) -> Result<()> {
        let seq_type: SequenceType = seq_type.parse()?;
        self.build_typed(file, seq_type, options)
    }

    pub fn build_typed(
        &self,
        file: &Path,
        seq_type: SequenceType,
        options: &MakeDbOptions,
    ) -> Result<()> {
        if !file.is_file() {
            return Err(BlastError::FileNotFound {
                path: file.to_path_buf(),
            });
        }

        if !options.overwrite && index_complete(file, seq_type) {
            log::info!("Index for {} already exists, skipping", file.display());
            return Ok(());
        }

        let mut invocation = Invocation::new("makeblastdb", &self.makeblastdb)
            .path_arg("-in", file)
            .args(["-dbtype", seq_type.dbtype()]);
        if let Some(title) = &options.title {
            invocation = invocation.arg("-title").arg(title.clone());
        }
        if let Some(taxid) = options.taxid {
            invocation = invocation.arg("-taxid").arg(taxid.to_string());
        }
        if options.parse_seqids {
            invocation = invocation.arg("-parse_seqids");
        }

        log::info!("Building {} database from {}", seq_type, file.display());
        let output = invocation.run(self.timeout, &[])?;

        if !output.stderr.trim().is_empty() {
            if self.fail_on_stderr {
                return Err(BlastError::ExternalTool {
                    program: invocation.program().to_string(),
                    args: invocation.arguments().to_vec(),
                    code: Some(0),
                    stderr: output.stderr,
                });
            }
            log::warn!("makeblastdb: {}", output.stderr.trim());
        }
        Ok(())
    }

    /// Summary of a built database as printed by `blastdbcmd -info`.
    pub fn info(&self, db: &Path) -> Result<String> {
        let blastdbcmd = self.blastdbcmd.as_ref().ok_or_else(|| BlastError::ExecutableNotFound {
            name: "blastdbcmd".to_string(),
            searched: "configured BLAST+ directory".to_string(),
        })?;
        let output = Invocation::new("blastdbcmd", blastdbcmd)
            .path_arg("-db", db)
            .arg("-info")
            .run(self.timeout, &[])?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_type() {
        assert_eq!("nucl".parse::<SequenceType>().unwrap(), SequenceType::Nucleotide);
        assert_eq!("Protein".parse::<SequenceType>().unwrap(), SequenceType::Protein);
        let err = "rna".parse::<SequenceType>().unwrap_err();
        assert!(matches!(err, BlastError::InvalidSequenceType(ref t) if t == "rna"));
    }

    #[test]
    fn test_index_files_keep_full_name() {
        let files = index_files(Path::new("/data/assembly.fna"), SequenceType::Nucleotide);
        assert_eq!(files.len(), 7);
        assert_eq!(files[2], PathBuf::from("/data/assembly.fna.nin"));
    }

    #[test]
    fn test_index_exists_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.faa");
        assert!(!index_exists(&db, SequenceType::Protein));

        std::fs::write(with_suffix(&db, "pal"), "").unwrap();
        assert!(index_exists(&db, SequenceType::Protein));
        assert!(!index_exists(&db, SequenceType::Nucleotide));

        let db2 = dir.path().join("big.fna");
        std::fs::write(with_suffix(&db2, "00.nin"), "").unwrap();
        assert!(index_exists(&db2, SequenceType::Nucleotide));
    }

    #[test]
    fn test_invalid_type_before_anything_else() {
        // Neither the executable nor the input exists; the tag is rejected first.
        let builder = DatabaseBuilder::new("/nonexistent/makeblastdb");
        let err = builder
            .build(Path::new("/nonexistent/in.fa"), "dna", &MakeDbOptions::default())
            .unwrap_err();
        assert!(matches!(err, BlastError::InvalidSequenceType(_)));
    }

    #[test]
    fn test_missing_input_file() {
        let builder = DatabaseBuilder::new("/nonexistent/makeblastdb");
        let err = builder
            .build(Path::new("/nonexistent/in.fa"), "nucl", &MakeDbOptions::default())
            .unwrap_err();
        assert!(matches!(err, BlastError::FileNotFound { .. }));
    }

    #[test]
    fn test_skip_when_complete_and_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("p.faa");
        std::fs::write(&file, ">p\nMKV\n").unwrap();
        for path in index_files(&file, SequenceType::Protein) {
            std::fs::write(path, "").unwrap();
        }
        let options = MakeDbOptions {
            overwrite: false,
            ..Default::default()
        };
        // Would fail with ExecutableNotFound if it tried to run.
        DatabaseBuilder::new("/nonexistent/makeblastdb")
            .build(&file, "prot", &options)
            .unwrap();
    }

    #[test]
    fn test_info_requires_blastdbcmd() {
        let builder = DatabaseBuilder::new("/nonexistent/makeblastdb");
        assert!(matches!(
            builder.info(Path::new("db")),
            Err(BlastError::ExecutableNotFound { .. })
        ));
    }
}
