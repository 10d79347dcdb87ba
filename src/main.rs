use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use blastrun::{
    parse_tabular, Blast, BlastConfig, MakeDbOptions, OutputFormat, Program, Query, SearchOptions,
};

#[derive(Parser)]
#[command(name = "blastrun")]
#[command(version)]
#[command(about = "Run NCBI BLAST+ searches against one or many databases")]
#[command(long_about = r#"
blastrun - NCBI BLAST+ search dispatch

Builds BLAST+ command lines, stages query sequences and runs one search per
database, in parallel, returning results in database order.

EXAMPLES:
  # Index two assemblies
  blastrun makedb -t nucl a.fna b.fna

  # Search both, one blastn process per database
  blastrun search -p blastn -q query.fasta -d a.fna -d b.fna

  # Query from stdin, forward extra BLAST+ flags
  cat query.fasta | blastrun search -p blastp -d prot.faa --flags "-evalue 1e-5 -matrix BLOSUM80"
"#)]
struct Cli {
    /// Directory containing the BLAST+ executables (default: search PATH)
    #[arg(
        short = 'B',
        long,
        env = "BLAST_PATH",
        value_name = "DIR",
        global = true,
        help_heading = "Runtime"
    )]
    blast_path: Option<PathBuf>,

    /// Kill any BLAST+ process running longer than this many seconds
    #[arg(long, value_name = "SECS", global = true, help_heading = "Runtime")]
    timeout: Option<u64>,

    #[arg(short = 'v', long, global = true, help_heading = "Output")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build BLAST databases with makeblastdb
    Makedb(MakedbArgs),
    /// Search a query against one or more databases
    Search(SearchArgs),
    /// Print the BLAST+ version
    Version,
}

#[derive(Args)]
struct MakedbArgs {
    /// FASTA files to index (index files are written next to each)
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Sequence type: nucl or prot
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    seq_type: String,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    taxid: Option<u32>,

    /// Keep an existing complete index instead of rebuilding it
    #[arg(long)]
    keep_existing: bool,

    #[arg(long)]
    parse_seqids: bool,

    /// Only warn about makeblastdb messages on stderr
    #[arg(long)]
    allow_warnings: bool,

    /// Print blastdbcmd -info for each database after building
    #[arg(long)]
    info: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// blastn, blastp, blastx, tblastn or tblastx
    #[arg(short = 'p', long, value_name = "PROGRAM")]
    program: Program,

    /// Query FASTA file (plain or .gz); reads stdin when omitted
    #[arg(short = 'q', long, value_name = "FILE")]
    query: Option<PathBuf>,

    /// Database path; repeat for several databases
    #[arg(short = 'd', long = "db", value_name = "DB", required = true)]
    databases: Vec<PathBuf>,

    /// Output format code (0-18)
    #[arg(short = 'f', long, value_name = "CODE", default_value = "6", help_heading = "Output")]
    outfmt: u8,

    /// Custom columns for outfmt 6, 7 or 10, e.g. "qseqid sseqid pident"
    #[arg(long, value_name = "COLS", help_heading = "Output")]
    columns: Option<String>,

    /// Write results here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE", help_heading = "Output")]
    output: Option<PathBuf>,

    /// Precede each database's results with a "# Database: <path>" line
    #[arg(long, help_heading = "Output")]
    headers: bool,

    /// One BLAST+ call over all databases instead of one call per database
    #[arg(long)]
    merged: bool,

    #[arg(short = 'e', long, value_name = "FLOAT", help_heading = "Search")]
    evalue: Option<f64>,

    #[arg(long, value_name = "NUM", help_heading = "Search")]
    max_target_seqs: Option<u32>,

    #[arg(long, value_name = "PERCENT", help_heading = "Search")]
    perc_identity: Option<f64>,

    /// Extra BLAST+ flags, e.g. "-word_size 11 -dust no"
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true, help_heading = "Search")]
    flags: Option<String>,

    /// Threads given to each BLAST+ process
    #[arg(long, value_name = "NUM", help_heading = "Runtime")]
    blast_threads: Option<u32>,

    /// Databases searched concurrently (0 = one per core, 1 = sequential)
    #[arg(short = 't', long, value_name = "NUM", default_value = "0", help_heading = "Runtime")]
    threads: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let mut config = BlastConfig::new();
    if let Some(dir) = &cli.blast_path {
        config = config.bin_dir(dir);
    }
    if let Some(secs) = cli.timeout {
        config = config.timeout(Duration::from_secs(secs));
    }

    match cli.command {
        Command::Makedb(args) => run_makedb(config, args),
        Command::Search(args) => run_search(config, args),
        Command::Version => {
            let blast = Blast::new(config).context("Failed to locate BLAST+")?;
            println!("{}", blast.version()?);
            Ok(())
        }
    }
}

fn run_makedb(config: BlastConfig, args: MakedbArgs) -> Result<()> {
    let blast = Blast::new(config.fail_on_stderr(!args.allow_warnings))
        .context("Failed to locate BLAST+")?;
    let options = MakeDbOptions {
        title: args.title,
        taxid: args.taxid,
        overwrite: !args.keep_existing,
        parse_seqids: args.parse_seqids,
    };

    for file in &args.files {
        blast
            .makeblastdb(file, &args.seq_type, &options)
            .with_context(|| format!("Failed to build database from {}", file.display()))?;
        if args.info {
            print!("{}", blast.database_info(file)?);
        }
    }
    Ok(())
}

fn run_search(config: BlastConfig, args: SearchArgs) -> Result<()> {
    let start_time = Instant::now();

    let outfmt = match &args.columns {
        Some(cols) => OutputFormat::with_columns(args.outfmt, cols.split_whitespace())?,
        None => OutputFormat::new(args.outfmt)?,
    };
    let standard_tabular = outfmt.is_standard_tabular();
    let blast = Blast::new(config.outfmt(outfmt).threads(args.threads))
        .context("Failed to locate BLAST+")?;

    let query = match &args.query {
        Some(path) => Query::file(path),
        None => {
            let text = io::read_to_string(io::stdin()).context("Failed to read query from stdin")?;
            Query::text(text)
        }
    };

    let mut options = match &args.flags {
        Some(flags) => SearchOptions::parse_flags(flags)?,
        None => SearchOptions::new(),
    };
    options.evalue = args.evalue;
    options.max_target_seqs = args.max_target_seqs;
    options.perc_identity = args.perc_identity;
    options.num_threads = args.blast_threads;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if args.merged {
        let out = blast.search_merged(&query, &args.databases, args.program, &options)?;
        writer.write_all(out.as_bytes())?;
    } else {
        let outputs = blast.search_each(&query, &args.databases, args.program, &options)?;
        for (db, out) in args.databases.iter().zip(&outputs) {
            if args.headers {
                writeln!(writer, "# Database: {}", db.display())?;
            }
            writer.write_all(out.as_bytes())?;
            if standard_tabular {
                log::info!("{}: {} hit(s)", db.display(), parse_tabular(out)?.len());
            }
        }
    }
    writer.flush()?;

    log::info!(
        "Searched {} database(s) in {:.1}s",
        args.databases.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
