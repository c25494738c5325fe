//! Effective configuration of one run.
//!
//! [`RunConfig`] merges the persistent [`Settings`](crate::settings::Settings)
//! with the values given on the command line. Command-line values win.
//!
//! ```
//! use gopt::config::RunConfig;
//! use gopt::settings::Settings;
//! use std::path::{Path, PathBuf};
//!
//! let config = RunConfig::new(Path::new("ethanol.com"), &Settings::default())
//!     .with_opt_steps(12)
//!     .with_restart_job(3);
//! assert_eq!(config.log_path, PathBuf::from("ethanol.out"));
//! assert_eq!(config.opt_steps, 12);
//! assert_eq!(config.max_retries, Some(20));
//! ```

use crate::naming::FileNaming;
use crate::settings::Settings;
use std::path::{Path, PathBuf};

/// Everything the orchestrator and the engine need for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Input deck
    pub input_path: PathBuf,
    /// Shared engine log, derived from `input_path`
    pub log_path: PathBuf,
    /// Shell command that runs Gaussian
    pub engine_command: String,
    /// Text marking a successful run
    pub termination_marker: String,
    /// Trailing log lines searched for the marker
    pub tail_lines: usize,
    /// `MaxCycles` injected into each optimization submission
    pub opt_steps: u32,
    /// Recovery submissions allowed per optimization job; `None` is unlimited
    pub max_retries: Option<u32>,
    /// 1-based number of the first deck job to run; `0` and `1` run all jobs
    pub restart_job: usize,
}

impl RunConfig {
    /// Builds the configuration for `input_path` from loaded settings.
    pub fn new(input_path: &Path, settings: &Settings) -> Self {
        let naming = FileNaming::new(input_path);
        Self {
            input_path: input_path.to_path_buf(),
            log_path: naming.output_log(),
            engine_command: settings.engine.command.clone(),
            termination_marker: settings.engine.termination_marker.clone(),
            tail_lines: settings.engine.tail_lines,
            opt_steps: settings.optimization.opt_steps,
            max_retries: retry_limit(settings.optimization.max_retries),
            restart_job: 0,
        }
    }

    /// Overrides the optimization cycles per submission.
    pub fn with_opt_steps(mut self, opt_steps: u32) -> Self {
        self.opt_steps = opt_steps;
        self
    }

    /// Overrides the retry limit; `0` means unlimited.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = retry_limit(max_retries);
        self
    }

    /// Starts the run at the given 1-based deck job.
    pub fn with_restart_job(mut self, restart_job: usize) -> Self {
        self.restart_job = restart_job;
        self
    }
}

fn retry_limit(max_retries: u32) -> Option<u32> {
    (max_retries > 0).then_some(max_retries)
}
