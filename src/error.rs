//! Error types for BLAST+ invocations and database builds.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, BlastError>;

/// Everything that can go wrong while preparing or running a BLAST+ tool.
///
/// Failures of the external process keep the full command line so the error
/// can be diagnosed without rerunning it.
#[derive(Debug, Error)]
pub enum BlastError {
    /// A required executable is missing from the configured directory or `PATH`.
    #[error("executable '{name}' not found (looked for {searched})")]
    ExecutableNotFound { name: String, searched: String },

    /// A database reference has no built index next to it.
    #[error("no BLAST database index found for {}", .path.display())]
    DatabaseNotFound { path: PathBuf },

    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// Empty, malformed or wrongly-typed input (query text, option values).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid sequence type '{0}': expected 'nucl' or 'prot'")]
    InvalidSequenceType(String),

    /// The tool ran and reported failure.
    #[error(
        "{program} failed (exit code: {}): {}\n  command: {}",
        .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
        .stderr.trim(),
        command_line(.program, .args)
    )]
    ExternalTool {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    #[error(
        "{program} timed out after {:.1}s\n  command: {}",
        .elapsed.as_secs_f64(),
        command_line(.program, .args)
    )]
    Timeout {
        program: String,
        args: Vec<String>,
        elapsed: Duration,
    },

    /// A line of tabular output could not be parsed.
    #[error("malformed tabular output at line {line}: {details}")]
    Parse { line: usize, details: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl BlastError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        BlastError::InvalidInput(msg.into())
    }

    /// Exit code of the external tool, if this error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BlastError::ExternalTool { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BlastError::Cancelled)
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_tool_message_has_command() {
        let err = BlastError::ExternalTool {
            program: "blastn".to_string(),
            args: vec!["-db".to_string(), "a b".to_string()],
            code: Some(2),
            stderr: "BLAST Database error\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code: 2"));
        assert!(msg.contains("BLAST Database error"));
        assert!(msg.contains("blastn -db \"a b\""));
        assert_eq!(err.exit_code(), Some(2));
    }

    #[test]
    fn test_signal_exit() {
        let err = BlastError::ExternalTool {
            program: "makeblastdb".to_string(),
            args: vec![],
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("exit code: signal"));
        assert!(!err.is_cancelled());
        assert!(BlastError::Cancelled.is_cancelled());
    }
}
