#![deny(missing_docs)]

//! gopt - Automated restarts for Gaussian geometry optimizations
//!
//! gopt runs a multi-job Gaussian input deck and keeps geometry
//! optimizations going until they converge. Every optimization is executed in
//! slices of a few cycles; when a slice ends without normal termination, gopt
//! builds a follow-up job that continues from the checkpoint file and submits
//! it again.
//!
//! # Overview
//!
//! 1. The [`deck`] parser splits the input into [`Job`]s (Link 0 commands,
//!    route section, title/charge block, molecule specification, trailing
//!    input), preserving the text exactly.
//! 2. Each job is classified from its route section ([`route`]): optimization,
//!    frequency, or other.
//! 3. The [`orchestrator`] submits jobs through an [`engine::Engine`]. For an
//!    optimization that does not finish:
//!    - if the previous deck job was a frequency calculation, that job is
//!      rerun on the checkpoint geometry and the optimization continues with
//!      `opt=ReadFC`;
//!    - otherwise the optimization continues from the checkpoint geometry with
//!      `opt=CalcFC`.
//!
//! All submissions append to a single log, `<deck>.out`.
//!
//! # Quick Start
//!
//! ```no_run
//! use gopt::config::RunConfig;
//! use gopt::orchestrator::run_deck;
//! use gopt::settings::SettingsManager;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsManager::load()?;
//!     let config = RunConfig::new(Path::new("ethanol.com"), settings.settings());
//!     let summary = run_deck(&config)?;
//!     println!("{} submissions", summary.submissions);
//!     Ok(())
//! }
//! ```
//!
//! # Route Rewrites
//!
//! | Situation | Route change |
//! |-----------|--------------|
//! | Every optimization slice | `opt=(...,MaxCycles=<opt_steps>)` |
//! | Restart after a frequency job | `opt=(...,ReadFC)` |
//! | Restart without a frequency job | `opt=(...,CalcFC) Geom=AllCheck Guess=TCheck` |
//! | Frequency rerun | `Geom=AllCheck Guess=TCheck` |
//!
//! # Modules
//!
//! - [`route`](route/index.html) - Route section model and rewrites
//! - [`job`](job/index.html) - Job records and derived jobs
//! - [`deck`](deck/index.html) - Input deck parsing
//! - [`engine`](engine/index.html) - Gaussian submission and log inspection
//! - [`orchestrator`](orchestrator/index.html) - Retry state machine
//! - [`config`](config/index.html) - Effective run configuration
//! - [`settings`](settings/index.html) - Configuration files
//! - [`naming`](naming/index.html) - Output file naming

/// Effective run configuration
pub mod config;
pub mod deck;
pub mod engine;
pub mod job;
/// Output file naming based on the input deck
pub mod naming;
pub mod orchestrator;
pub mod route;
/// Configuration management system
pub mod settings;

pub use job::Job;
pub use orchestrator::{Orchestrator, RunError, RunSummary};
