//! BLAST Search Dispatcher
//!
//! Builds one BLAST+ invocation per database, runs them on a worker pool and
//! returns stdout for each database in the order the databases were given.
//!
//! # Workflow
//! ```text
//! query -> validate/stage -> [db 1, db 2, ...] -> one process each -> [out 1, out 2, ...]
//! ```
//!
//! A query given as text is staged once, read-only, and shared by every
//! invocation of the call. The staged file is removed when the call returns,
//! whatever the outcome.
//!
//! # Failure Policy
//! The first failing database aborts the whole call: sibling processes are
//! killed, pending ones are skipped, and that failure is returned. There are
//! no partial results.
//!
//! # Example
//! ```no_run
//! use blastrun::{Blast, BlastConfig, Program, Query, SearchOptions};
//!
//! let blast = Blast::new(BlastConfig::new().bin_dir("/opt/ncbi-blast/bin"))?;
//! let outputs = blast.search_each(
//!     &Query::text(">q1\nACGTACGTACGT\n"),
//!     &["a.fna", "b.fna"],
//!     Program::Blastn,
//!     &SearchOptions::new().evalue(1e-5),
//! )?;
//! assert_eq!(outputs.len(), 2);
//! # Ok::<(), blastrun::BlastError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::config::{BlastConfig, SearchOptions};
use crate::error::{BlastError, Result};
use crate::invocation::{CancelToken, Invocation};
use crate::makedb::{self, DatabaseBuilder, MakeDbOptions, SequenceType};
use crate::query::Query;
use crate::seqio;
use crate::tools::{Program, Toolchain};

/// One database or an ordered list of databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Databases {
    Single(PathBuf),
    Many(Vec<PathBuf>),
}

impl Databases {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Databases::Single(path) => std::slice::from_ref(path),
            Databases::Many(paths) => paths,
        }
    }
}

impl From<&Path> for Databases {
    fn from(path: &Path) -> Self {
        Databases::Single(path.to_path_buf())
    }
}

impl From<PathBuf> for Databases {
    fn from(path: PathBuf) -> Self {
        Databases::Single(path)
    }
}

impl From<&PathBuf> for Databases {
    fn from(path: &PathBuf) -> Self {
        Databases::Single(path.clone())
    }
}

impl From<&str> for Databases {
    fn from(path: &str) -> Self {
        Databases::Single(PathBuf::from(path))
    }
}

impl<P: AsRef<Path>> From<Vec<P>> for Databases {
    fn from(paths: Vec<P>) -> Self {
        Databases::Many(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

impl<P: AsRef<Path>> From<&[P]> for Databases {
    fn from(paths: &[P]) -> Self {
        Databases::Many(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

impl<P: AsRef<Path>, const N: usize> From<&[P; N]> for Databases {
    fn from(paths: &[P; N]) -> Self {
        Databases::Many(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

/// Result of [`Blast::search`], shaped like the database argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutput {
    Single(String),
    Many(Vec<String>),
}

impl SearchOutput {
    /// Outputs in database order; a single output becomes a one-element list.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SearchOutput::Single(out) => vec![out],
            SearchOutput::Many(outs) => outs,
        }
    }
}

/// Entry point: runs BLAST+ searches and database builds.
pub struct Blast {
    config: BlastConfig,
    tools: Toolchain,
    builder: DatabaseBuilder,
    pool: Option<Arc<ThreadPool>>,
}

impl Blast {
    /// Locates every BLAST+ program and prepares the worker pool.
    pub fn new(config: BlastConfig) -> Result<Self> {
        let tools = Toolchain::resolve(config.bin_dir.as_deref())?;
        let builder = DatabaseBuilder::new(&tools.makeblastdb)
            .blastdbcmd(tools.blastdbcmd.clone())
            .timeout(config.timeout)
            .fail_on_stderr(config.fail_on_stderr);

        let pool = if config.threads == 1 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("blastrun-{}", i))
                .build()
                .map_err(|e| BlastError::ThreadPool(e.to_string()))?;
            Some(Arc::new(pool))
        };

        Ok(Self {
            config,
            tools,
            builder,
            pool,
        })
    }

    pub fn config(&self) -> &BlastConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.tools
    }

    /// Searches one database, or each of several databases.
    ///
    /// A single database yields [`SearchOutput::Single`]; a list yields
    /// [`SearchOutput::Many`] with one entry per database, in input order.
    pub fn search(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        program: Program,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        match databases.into() {
            Databases::Single(db) => self
                .search_one(query, &db, program, options)
                .map(SearchOutput::Single),
            Databases::Many(dbs) => self
                .search_each(query, &dbs, program, options)
                .map(SearchOutput::Many),
        }
    }

    /// Searches a single database and returns the tool's stdout.
    pub fn search_one(
        &self,
        query: &Query,
        db: &Path,
        program: Program,
        options: &SearchOptions,
    ) -> Result<String> {
        let mut outputs = self.search_each(query, std::slice::from_ref(&db), program, options)?;
        Ok(outputs.pop().unwrap_or_default())
    }

    /// Searches each database separately; element `i` belongs to `dbs[i]`.
    pub fn search_each<P: AsRef<Path> + Sync>(
        &self,
        query: &Query,
        dbs: &[P],
        program: Program,
        options: &SearchOptions,
    ) -> Result<Vec<String>> {
        let base_args = self.base_args(options)?;
        for db in dbs {
            self.check_database(db.as_ref(), program)?;
        }

        let staged = query.stage()?;
        if dbs.is_empty() {
            return Ok(Vec::new());
        }

        let invocations: Vec<Invocation> = dbs
            .iter()
            .map(|db| {
                Invocation::new(program.name(), self.tools.program(program))
                    .path_arg("-query", staged.path())
                    .path_arg("-db", db.as_ref())
                    .args(base_args.iter().cloned())
            })
            .collect();

        log::debug!("{}: {} database(s)", program, invocations.len());
        let outputs = self.run_all(&invocations, options.cancel.as_ref());
        drop(staged);
        outputs
    }

    /// Searches all databases in a single BLAST+ call.
    ///
    /// The databases are joined into one `-db` argument and BLAST+ merges the
    /// hits itself. Paths containing whitespace cannot be expressed this way.
    pub fn search_merged<P: AsRef<Path>>(
        &self,
        query: &Query,
        dbs: &[P],
        program: Program,
        options: &SearchOptions,
    ) -> Result<String> {
        if dbs.is_empty() {
            return Err(BlastError::invalid_input("no databases given"));
        }
        let base_args = self.base_args(options)?;
        let mut joined = Vec::with_capacity(dbs.len());
        for db in dbs {
            let db = db.as_ref();
            self.check_database(db, program)?;
            let text = db.to_string_lossy();
            if text.contains(char::is_whitespace) {
                return Err(BlastError::invalid_input(format!(
                    "database paths may not contain blanks in a merged search: {}",
                    db.display()
                )));
            }
            joined.push(text.into_owned());
        }

        let staged = query.stage()?;
        let invocation = Invocation::new(program.name(), self.tools.program(program))
            .path_arg("-query", staged.path())
            .arg("-db")
            .arg(joined.join(" "))
            .args(base_args);

        let cancel: Vec<&CancelToken> = options.cancel.iter().collect();
        let output = invocation.run(self.config.timeout, &cancel)?;
        Ok(output.stdout)
    }

    pub fn blastn(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        self.search_checked(query, databases.into(), Program::Blastn, options)
    }

    pub fn blastp(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        self.search_checked(query, databases.into(), Program::Blastp, options)
    }

    pub fn blastx(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        self.search_checked(query, databases.into(), Program::Blastx, options)
    }

    pub fn tblastn(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        self.search_checked(query, databases.into(), Program::Tblastn, options)
    }

    pub fn tblastx(
        &self,
        query: &Query,
        databases: impl Into<Databases>,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        self.search_checked(query, databases.into(), Program::Tblastx, options)
    }

    /// Builds a database index next to `file`; `seq_type` is `nucl` or `prot`.
    pub fn makeblastdb(&self, file: &Path, seq_type: &str, options: &MakeDbOptions) -> Result<()> {
        self.builder.build(file, seq_type, options)
    }

    pub fn database_info(&self, db: &Path) -> Result<String> {
        self.builder.info(db)
    }

    pub fn builder(&self) -> &DatabaseBuilder {
        &self.builder
    }

    /// BLAST+ version string, e.g. `2.15.0+`.
    pub fn version(&self) -> Result<String> {
        let output = Invocation::new(Program::Blastp.name(), &self.tools.blastp)
            .arg("-version")
            .run(self.config.timeout, &[])?;
        output
            .stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .map(str::to_string)
            .ok_or_else(|| BlastError::Parse {
                line: 1,
                details: format!("unexpected version output: {:?}", output.stdout),
            })
    }

    fn search_checked(
        &self,
        query: &Query,
        databases: Databases,
        program: Program,
        options: &SearchOptions,
    ) -> Result<SearchOutput> {
        let text = query.load_text()?;
        let matches = match program.query_type() {
            SequenceType::Nucleotide => seqio::is_dna(&text)?,
            SequenceType::Protein => seqio::is_protein(&text)?,
        };
        if !matches {
            let expected = match program.query_type() {
                SequenceType::Nucleotide => "DNA",
                SequenceType::Protein => "protein",
            };
            return Err(BlastError::invalid_input(format!(
                "query is not a valid {} sequence for {}",
                expected, program
            )));
        }
        self.search(query, databases, program, options)
    }

    fn base_args(&self, options: &SearchOptions) -> Result<Vec<String>> {
        let mut args = vec![
            "-outfmt".to_string(),
            options.effective_outfmt(&self.config).to_arg(),
        ];
        args.extend(options.to_args()?);
        Ok(args)
    }

    fn check_database(&self, db: &Path, program: Program) -> Result<()> {
        if makedb::index_exists(db, program.database_type()) {
            Ok(())
        } else {
            Err(BlastError::DatabaseNotFound {
                path: db.to_path_buf(),
            })
        }
    }

    fn run_all(
        &self,
        invocations: &[Invocation],
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<String>> {
        let abort = CancelToken::new();
        let timeout = self.config.timeout;

        let run_one = |invocation: &Invocation| -> Result<String> {
            let mut tokens = vec![&abort];
            tokens.extend(cancel);
            let result = invocation.run(timeout, &tokens).map(|out| out.stdout);
            if result.is_err() {
                abort.cancel();
            }
            result
        };

        let results: Vec<Result<String>> = match &self.pool {
            Some(pool) if invocations.len() > 1 => {
                pool.install(|| invocations.par_iter().map(run_one).collect())
            }
            _ => invocations.iter().map(run_one).collect(),
        };

        first_failure(results)
    }
}

/// Collapses per-database results, surfacing the first real failure in input order.
///
/// Siblings killed because another database failed report `Cancelled`; those
/// only win when nothing else failed (i.e. the caller cancelled).
fn first_failure(results: Vec<Result<String>>) -> Result<Vec<String>> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut cancelled = false;
    let mut failure = None;

    for result in results {
        match result {
            Ok(out) => outputs.push(out),
            Err(BlastError::Cancelled) => cancelled = true,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if cancelled {
        return Err(BlastError::Cancelled);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_databases_conversions() {
        assert_eq!(Databases::from("a.fna"), Databases::Single(PathBuf::from("a.fna")));
        let many = Databases::from(vec!["a.fna", "b.fna"]);
        assert_eq!(many.paths().len(), 2);
        let arr = Databases::from(&["x", "y", "z"]);
        assert_eq!(arr.paths()[2], PathBuf::from("z"));
    }

    #[test]
    fn test_first_failure_prefers_real_error() {
        let results = vec![
            Err(BlastError::Cancelled),
            Ok("hit".to_string()),
            Err(BlastError::invalid_input("bad")),
        ];
        assert!(matches!(first_failure(results), Err(BlastError::InvalidInput(_))));

        let results = vec![Ok("a".to_string()), Err(BlastError::Cancelled)];
        assert!(matches!(first_failure(results), Err(BlastError::Cancelled)));

        let results = vec![Ok("a".to_string()), Ok(String::new())];
        assert_eq!(first_failure(results).unwrap(), vec!["a".to_string(), String::new()]);
    }

    #[test]
    fn test_search_output_into_vec() {
        assert_eq!(SearchOutput::Single("x".into()).into_vec(), vec!["x".to_string()]);
    }
}
