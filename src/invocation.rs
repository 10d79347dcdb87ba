//! One external BLAST+ process: its command line and its execution.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{BlastError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between a caller and running searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A fully-assembled command line for one BLAST+ program.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    executable: PathBuf,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `flag path`; non-UTF-8 paths are converted lossily.
    pub fn path_arg(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.to_string_lossy().into_owned())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Runs the process to completion and returns its output.
    ///
    /// A non-zero exit status becomes [`BlastError::ExternalTool`]. If any of
    /// `cancel` fires, or `timeout` elapses, the child is killed first.
    pub fn run(&self, timeout: Option<Duration>, cancel: &[&CancelToken]) -> Result<ToolOutput> {
        if cancel.iter().any(|t| t.is_cancelled()) {
            return Err(BlastError::Cancelled);
        }

        log::debug!("Running: {} {}", self.executable.display(), self.args.join(" "));

        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BlastError::ExecutableNotFound {
                    name: self.program.clone(),
                    searched: self.executable.display().to_string(),
                },
                _ => BlastError::from(e),
            })?;

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let waited = if timeout.is_none() && cancel.is_empty() {
            child.wait().map_err(BlastError::from)
        } else {
            self.wait_watched(&mut child, timeout, cancel)
        };

        // On timeout or cancellation the readers are left detached: a grandchild
        // may still hold the pipes open.
        let status = waited?;
        let stdout = join_capture(stdout)?;
        let stderr = join_capture(stderr)?;

        if !status.success() {
            return Err(BlastError::ExternalTool {
                program: self.program.clone(),
                args: self.args.clone(),
                code: status.code(),
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }

    fn wait_watched(
        &self,
        child: &mut Child,
        timeout: Option<Duration>,
        cancel: &[&CancelToken],
    ) -> Result<std::process::ExitStatus> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            if cancel.iter().any(|t| t.is_cancelled()) {
                kill(child);
                log::debug!("Cancelled {}", self.program);
                return Err(BlastError::Cancelled);
            }

            if let Some(limit) = timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    kill(child);
                    log::warn!("{} exceeded timeout of {:.1}s", self.program, limit.as_secs_f64());
                    return Err(BlastError::Timeout {
                        program: self.program.clone(),
                        args: self.args.clone(),
                        elapsed,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    // The child may already have exited between try_wait and kill.
    let _ = child.kill();
    let _ = child.wait();
}

type Capture = JoinHandle<std::io::Result<String>>;

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Capture> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        })
    })
}

fn join_capture(handle: Option<Capture>) -> Result<String> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| BlastError::Io {
                source: std::io::Error::new(ErrorKind::Other, "output reader thread panicked"),
            })?
            .map_err(BlastError::from),
        None => Ok(String::new()),
    }
}
