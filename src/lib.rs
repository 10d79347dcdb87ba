//! blastrun - NCBI BLAST+ Search Dispatch
//!
//! Runs BLAST+ searches against one or many databases and builds databases
//! with makeblastdb. Alignment, scoring and indexing are done by the BLAST+
//! executables; this crate assembles their command lines, stages query input
//! and returns their output.
//!
//! # Modules
//! - `config`: dispatcher settings, output format, per-call search options
//! - `tools`: search program variants and executable resolution
//! - `seqio`: FASTA reading (plain/gzip/in-memory) and alphabet checks
//! - `query`: query input and temporary staging
//! - `invocation`: external process execution with timeout and cancellation
//! - `dispatcher`: multi-database search dispatch
//! - `makedb`: database building and inspection
//! - `tabular`: parsing of tabular (`-outfmt 6`) output
//! - `error`: error taxonomy

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod invocation;
pub mod makedb;
pub mod query;
pub mod seqio;
pub mod tabular;
pub mod tools;

pub use config::{BlastConfig, OutputFormat, SearchOptions};
pub use dispatcher::{Blast, Databases, SearchOutput};
pub use error::{BlastError, Result};
pub use invocation::CancelToken;
pub use makedb::{DatabaseBuilder, MakeDbOptions, SequenceType};
pub use query::Query;
pub use tabular::{parse_tabular, TabularHit};
pub use tools::Program;
