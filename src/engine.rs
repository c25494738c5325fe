//! Submission of jobs to the Gaussian engine.
//!
//! The [`Engine`] trait is the seam between the retry logic and the program
//! that actually performs the calculation. [`GaussianEngine`] is the real
//! implementation:
//!
//! - the job text is piped to a shell command on standard input,
//! - standard output and standard error are appended to one log file shared
//!   by every submission of the run,
//! - a non-zero exit status is an [`EngineError::ExitStatus`],
//! - otherwise the last lines of the log are searched for the normal
//!   termination marker to decide between [`Termination::Normal`] and
//!   [`Termination::Abnormal`].
//!
//! Each submission blocks until the engine process exits. There is no
//! timeout.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use gopt::engine::{Engine, GaussianEngine, Termination};
//! use gopt::job::Job;
//!
//! let mut engine = GaussianEngine::new("g16", "water.out");
//! # let job = Job::default();
//! if engine.submit(&job)? == Termination::Normal {
//!     println!("done");
//! }
//! # Ok::<(), gopt::engine::EngineError>(())
//! ```

use crate::config::RunConfig;
use crate::job::Job;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Marker Gaussian prints as the last line of a successful run.
pub const NORMAL_TERMINATION: &str = "Normal termination of Gaussian";

/// Number of trailing log lines searched for the termination marker.
pub const DEFAULT_TAIL_LINES: usize = 10;

/// Size of the window read from the end of the log.
const TAIL_WINDOW_BYTES: u64 = 16 * 1024;

/// Error type for engine submissions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// File system error on the shared log
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The engine command could not be started
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        /// Shell command that was run
        command: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },
    /// The engine command exited with a non-zero status
    #[error("Gaussian returned error code={}", exit_code(.code))]
    ExitStatus {
        /// Exit code, `None` if the process was killed by a signal
        code: Option<i32>,
    },
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Type alias for engine results
type Result<T> = std::result::Result<T, EngineError>;

/// Outcome of a submission that exited cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The normal termination marker was found
    Normal,
    /// The engine exited with status 0 but did not report normal termination
    Abnormal,
}

/// Something that can run a Gaussian job to completion.
pub trait Engine {
    /// Runs `job` and blocks until it finishes.
    ///
    /// # Returns
    ///
    /// - `Ok(Termination::Normal)` - the job completed
    /// - `Ok(Termination::Abnormal)` - the job ran but did not complete
    ///   (for example an optimization that ran out of cycles)
    /// - `Err(EngineError)` - the engine could not be run or exited with an
    ///   error status
    fn submit(&mut self, job: &Job) -> Result<Termination>;
}

/// Runs jobs through a shell command, appending all output to one log.
#[derive(Debug, Clone)]
pub struct GaussianEngine {
    /// Shell command reading the job on stdin (e.g. `g16`)
    pub command: String,
    /// Log file shared by all submissions
    pub log_path: PathBuf,
    /// Text identifying a successful run
    pub marker: String,
    /// Number of trailing log lines searched for `marker`
    pub tail_lines: usize,
}

impl GaussianEngine {
    /// Creates an engine with the default marker and tail size.
    pub fn new(command: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            log_path: log_path.into(),
            marker: NORMAL_TERMINATION.to_string(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }

    /// Creates an engine from the effective run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            command: config.engine_command.clone(),
            log_path: config.log_path.clone(),
            marker: config.termination_marker.clone(),
            tail_lines: config.tail_lines,
        }
    }

    fn open_log(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
    }
}

impl Engine for GaussianEngine {
    fn submit(&mut self, job: &Job) -> Result<Termination> {
        let stdout = self.open_log()?;
        let stderr = stdout.try_clone()?;

        debug!("Submitting to '{}':\n{}", self.command, job);
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // An engine that exits without reading its input is judged by
            // its exit status alone.
            match stdin.write_all(job.to_string().as_bytes()) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
                _ => {}
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(EngineError::ExitStatus {
                code: status.code(),
            });
        }

        let tail = log_tail(&self.log_path, self.tail_lines)?;
        let termination = if tail.contains(&self.marker) {
            Termination::Normal
        } else {
            Termination::Abnormal
        };
        debug!("Log tail inspected: {:?}", termination);
        Ok(termination)
    }
}

/// Returns the last `lines` lines of the file at `path`.
///
/// Only the final 16 KiB of the file are read, so very long lines at the end
/// of the log may be truncated. Invalid UTF-8 is replaced.
pub fn log_tail(path: &Path, lines: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TAIL_WINDOW_BYTES)))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}
