//! BLAST+ Executable Resolution
//!
//! Maps the search variants and the database builder onto the BLAST+
//! program names and locates them on disk once, when the dispatcher is built.
//!
//! # Lookup Order
//! - With a configured directory: `<dir>/<name>` only
//! - Without one: every entry of `PATH`, first hit wins

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BlastError, Result};
use crate::makedb::SequenceType;

/// Search variants supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    /// Nucleotide query against a nucleotide database.
    Blastn,
    /// Protein query against a protein database.
    Blastp,
    /// Translated nucleotide query against a protein database.
    Blastx,
    /// Protein query against a translated nucleotide database.
    Tblastn,
    /// Translated nucleotide query against a translated nucleotide database.
    Tblastx,
}

impl Program {
    pub const ALL: [Program; 5] = [
        Program::Blastn,
        Program::Blastp,
        Program::Blastx,
        Program::Tblastn,
        Program::Tblastx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Program::Blastn => "blastn",
            Program::Blastp => "blastp",
            Program::Blastx => "blastx",
            Program::Tblastn => "tblastn",
            Program::Tblastx => "tblastx",
        }
    }

    /// Molecule type the query must be written in.
    pub fn query_type(self) -> SequenceType {
        match self {
            Program::Blastn | Program::Blastx | Program::Tblastx => SequenceType::Nucleotide,
            Program::Blastp | Program::Tblastn => SequenceType::Protein,
        }
    }

    /// Molecule type of the databases this program searches.
    pub fn database_type(self) -> SequenceType {
        match self {
            Program::Blastn | Program::Tblastn | Program::Tblastx => SequenceType::Nucleotide,
            Program::Blastp | Program::Blastx => SequenceType::Protein,
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Program {
    type Err = BlastError;

    fn from_str(s: &str) -> Result<Self> {
        Program::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                BlastError::invalid_input(format!(
                    "unknown program '{}': expected blastn, blastp, blastx, tblastn or tblastx",
                    s
                ))
            })
    }
}

/// Locate an executable, either inside `dir` or on `PATH`.
pub fn find_executable(name: &str, dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        let full_path = dir.join(name);
        if is_executable(&full_path) {
            return Ok(full_path);
        }
        return Err(BlastError::ExecutableNotFound {
            name: name.to_string(),
            searched: dir.display().to_string(),
        });
    }

    let path = Path::new(name);
    if path.is_absolute() && is_executable(path) {
        return Ok(path.to_path_buf());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if is_executable(&full_path) {
                return Ok(full_path);
            }
        }
    }

    Err(BlastError::ExecutableNotFound {
        name: name.to_string(),
        searched: "PATH".to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Absolute locations of every BLAST+ program the crate drives.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub makeblastdb: PathBuf,
    pub blastn: PathBuf,
    pub blastp: PathBuf,
    pub blastx: PathBuf,
    pub tblastn: PathBuf,
    pub tblastx: PathBuf,
    /// Only needed for database info queries.
    pub blastdbcmd: Option<PathBuf>,
}

impl Toolchain {
    /// Resolve all programs, failing on the first required one that is missing.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        let toolchain = Self {
            makeblastdb: find_executable("makeblastdb", dir)?,
            blastn: find_executable(Program::Blastn.name(), dir)?,
            blastp: find_executable(Program::Blastp.name(), dir)?,
            blastx: find_executable(Program::Blastx.name(), dir)?,
            tblastn: find_executable(Program::Tblastn.name(), dir)?,
            tblastx: find_executable(Program::Tblastx.name(), dir)?,
            blastdbcmd: find_executable("blastdbcmd", dir).ok(),
        };
        log::debug!("Resolved BLAST+ toolchain: {:?}", toolchain);
        Ok(toolchain)
    }

    pub fn program(&self, program: Program) -> &Path {
        match program {
            Program::Blastn => &self.blastn,
            Program::Blastp => &self.blastp,
            Program::Blastx => &self.blastx,
            Program::Tblastn => &self.tblastn,
            Program::Tblastx => &self.tblastx,
        }
    }
}
