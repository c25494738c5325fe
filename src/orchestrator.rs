//! Restart-driven execution of a Gaussian deck.
//!
//! Jobs run strictly in deck order. A job that does not optimize is
//! submitted once. An optimization is submitted in slices of
//! `opt_steps` cycles (`opt=(MaxCycles=n)`), and each slice that ends without
//! normal termination is followed by a recovery step chosen by
//! [`JobPlan`]:
//!
//! - [`JobPlan::OptimizeAfterFrequency`]: the preceding deck job is a
//!   frequency calculation. It is rerun on the checkpoint geometry to refresh
//!   the force constants, then the optimization continues with `ReadFC`. If
//!   that frequency rerun fails the whole run fails.
//! - [`JobPlan::Optimize`]: no frequency job precedes. The optimization
//!   continues from the checkpoint geometry with `CalcFC`.
//!
//! The number of recovery steps per job is capped by `max_retries`
//! ([`RunError::RetriesExhausted`]); `None` keeps retrying until the engine
//! succeeds or fails hard.
//!
//! ```text
//!                ┌──────────────────── abnormal ───────────────────┐
//!                v                                                  │
//! opt(MaxCycles) ──> normal ──> done          recovery submission ──┘
//!        │                                             ^
//!        └── abnormal ──> [freq rerun ──> ReadFC] or [chk + CalcFC]
//! ```

use crate::config::RunConfig;
use crate::deck::{self, ParseError};
use crate::engine::{Engine, EngineError, GaussianEngine, Termination};
use crate::job::{Derivation, Job, JobKind};
use crate::route::{ForceConstants, RouteError};
use log::{info, warn};
use thiserror::Error;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    /// The deck could not be read or is truncated
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A route edit was requested that the job does not support
    #[error("Job {job}: {source}")]
    Semantic {
        /// 1-based deck job number
        job: usize,
        /// Route edit failure
        #[source]
        source: RouteError,
    },
    /// The engine could not be run or exited with an error status
    #[error("Job {job}: {source}")]
    Engine {
        /// 1-based deck job number
        job: usize,
        /// Engine failure
        #[source]
        source: EngineError,
    },
    /// The frequency rerun used to recover an optimization did not complete
    #[error("Job {job}: Freq calculation did not complete! (rerun of job {frequency_job})")]
    FallbackFailed {
        /// 1-based number of the optimization being recovered
        job: usize,
        /// 1-based number of the frequency job that was rerun
        frequency_job: usize,
    },
    /// The optimization did not converge within the allowed recovery steps
    #[error("Job {job}: optimization did not converge after {attempts} restarts")]
    RetriesExhausted {
        /// 1-based deck job number
        job: usize,
        /// Recovery submissions made
        attempts: u32,
    },
}

/// Type alias for run results
type Result<T> = std::result::Result<T, RunError>;

/// How a deck job is executed, decided from the job and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPlan<'a> {
    /// Not an optimization: submit once
    Single,
    /// Optimization without a preceding frequency job
    Optimize,
    /// Optimization directly after a frequency job
    OptimizeAfterFrequency {
        /// The preceding frequency job
        frequency: &'a Job,
    },
}

impl<'a> JobPlan<'a> {
    /// Chooses the plan for `job` given the job right before it in the deck.
    pub fn for_job(job: &Job, preceding: Option<&'a Job>) -> Self {
        if !job.is_optimization() {
            return JobPlan::Single;
        }
        match preceding {
            Some(frequency) if frequency.is_frequency() => {
                JobPlan::OptimizeAfterFrequency { frequency }
            }
            _ => JobPlan::Optimize,
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Deck jobs executed to completion
    pub jobs_run: usize,
    /// Deck jobs skipped because of a restart
    pub jobs_skipped: usize,
    /// Submissions made to the engine
    pub submissions: usize,
}

/// Drives the jobs of a deck through an [`Engine`].
pub struct Orchestrator<E> {
    engine: E,
    opt_steps: u32,
    max_retries: Option<u32>,
    restart_job: usize,
    submissions: usize,
}

impl<E: Engine> Orchestrator<E> {
    /// Creates an orchestrator running every job with `opt_steps` cycles per
    /// optimization slice and no retry limit.
    pub fn new(engine: E, opt_steps: u32) -> Self {
        Self {
            engine,
            opt_steps,
            max_retries: None,
            restart_job: 0,
            submissions: 0,
        }
    }

    /// Creates an orchestrator with the limits of `config`.
    pub fn from_config(engine: E, config: &RunConfig) -> Self {
        Self::new(engine, config.opt_steps)
            .with_max_retries(config.max_retries)
            .with_restart_job(config.restart_job)
    }

    /// Caps the recovery submissions per optimization job.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Skips deck jobs before the given 1-based job number.
    pub fn with_restart_job(mut self, restart_job: usize) -> Self {
        self.restart_job = restart_job;
        self
    }

    /// Returns the engine, e.g. to inspect it after a run.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs all jobs in deck order.
    ///
    /// Stops at the first fatal error; jobs completed before it stay
    /// completed.
    pub fn run(&mut self, jobs: &[Job]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut preceding: Option<&Job> = None;

        for (index, job) in jobs.iter().enumerate() {
            let number = index + 1;
            if number < self.restart_job {
                info!("Skipping job {} ({})", number, job.kind());
                summary.jobs_skipped += 1;
                preceding = Some(job);
                continue;
            }

            let plan = JobPlan::for_job(job, preceding);
            info!("Job {} ({}): {}", number, job.kind(), job.summary());
            self.run_job(number, job, plan)?;
            info!("Job {} completed", number);

            summary.jobs_run += 1;
            preceding = Some(job);
        }

        summary.submissions = self.submissions;
        Ok(summary)
    }

    fn run_job(&mut self, number: usize, job: &Job, plan: JobPlan<'_>) -> Result<()> {
        match plan {
            JobPlan::Single => {
                if self.submit(number, job, "as written")? == Termination::Abnormal {
                    warn!("Job {} did not report normal termination", number);
                }
                Ok(())
            }
            JobPlan::Optimize => {
                let restart = Derivation::new()
                    .checkpoint_geometry()
                    .opt_steps(self.opt_steps)
                    .force_constants(ForceConstants::Calculate);
                let restart = self.derive(number, job, &restart)?;
                self.optimize(number, job, |this| {
                    this.submit(number, &restart, "restart from checkpoint with CalcFC")
                })
            }
            JobPlan::OptimizeAfterFrequency { frequency } => {
                let refresh = frequency.with_checkpoint_geometry();
                let restart = Derivation::new()
                    .opt_steps(self.opt_steps)
                    .force_constants(ForceConstants::Read);
                let restart = self.derive(number, job, &restart)?;
                self.optimize(number, job, |this| {
                    let status = this.submit(number, &refresh, "frequency rerun on checkpoint")?;
                    if status != Termination::Normal {
                        return Err(RunError::FallbackFailed {
                            job: number,
                            frequency_job: number - 1,
                        });
                    }
                    this.submit(number, &restart, "restart with ReadFC")
                })
            }
        }
    }

    /// Submits the first slice of an optimization, then calls `recover`
    /// until the engine reports normal termination.
    fn optimize<F>(&mut self, number: usize, job: &Job, mut recover: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<Termination>,
    {
        let first = self.derive(number, job, &Derivation::new().opt_steps(self.opt_steps))?;
        let mut status = self.submit(number, &first, "first optimization slice")?;

        let mut attempts = 0;
        while status != Termination::Normal {
            if self.max_retries.is_some_and(|max| attempts >= max) {
                return Err(RunError::RetriesExhausted {
                    job: number,
                    attempts,
                });
            }
            attempts += 1;
            warn!(
                "Job {} did not converge, restart {}{}",
                number,
                attempts,
                self.max_retries
                    .map(|max| format!(" of {}", max))
                    .unwrap_or_default()
            );
            status = recover(self)?;
        }
        Ok(())
    }

    fn derive(&self, number: usize, job: &Job, derivation: &Derivation) -> Result<Job> {
        job.derive(derivation)
            .map_err(|source| RunError::Semantic { job: number, source })
    }

    fn submit(&mut self, number: usize, job: &Job, what: &str) -> Result<Termination> {
        self.submissions += 1;
        info!("Job {}: submitting {} (submission {})", number, what, self.submissions);
        self.engine
            .submit(job)
            .map_err(|source| RunError::Engine { job: number, source })
    }
}

/// Parses the deck of `config` and runs it through Gaussian.
pub fn run_deck(config: &RunConfig) -> Result<RunSummary> {
    let jobs = deck::read_deck(&config.input_path)?;
    info!(
        "Read {} jobs from {}",
        jobs.len(),
        config.input_path.display()
    );
    let optimizations = jobs
        .iter()
        .filter(|job| job.kind() == JobKind::Optimization)
        .count();
    info!(
        "{} optimization jobs, output appended to {}",
        optimizations,
        config.log_path.display()
    );

    let engine = GaussianEngine::from_config(config);
    let mut orchestrator = Orchestrator::from_config(engine, config);
    let summary = orchestrator.run(&jobs)?;
    info!(
        "Finished: {} jobs run, {} skipped, {} submissions",
        summary.jobs_run, summary.jobs_skipped, summary.submissions
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted outcomes and records every submitted job.
    struct ScriptedEngine {
        outcomes: VecDeque<std::result::Result<Termination, i32>>,
        submitted: Vec<Job>,
    }

    impl ScriptedEngine {
        fn new(outcomes: Vec<std::result::Result<Termination, i32>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                submitted: Vec::new(),
            }
        }
    }

    impl Engine for ScriptedEngine {
        fn submit(&mut self, job: &Job) -> std::result::Result<Termination, EngineError> {
            self.submitted.push(job.clone());
            match self.outcomes.pop_front() {
                Some(Ok(termination)) => Ok(termination),
                Some(Err(code)) => Err(EngineError::ExitStatus { code: Some(code) }),
                None => panic!("unexpected submission:\n{}", job),
            }
        }
    }

    fn job(command: &str) -> Job {
        Job {
            preamble: "%chk=mol.chk\n".to_string(),
            command: format!("{}\n", command),
            annotation: "\nmol\n\n0 1\n".to_string(),
            geometry: "H 0 0 0\nH 0 0 0.74\n".to_string(),
            trailer: "\n".to_string(),
        }
    }

    use crate::engine::Termination::{Abnormal, Normal};

    #[test]
    fn test_plan_selection() {
        let opt = job("#P HF/3-21G opt");
        let freq = job("#P HF/3-21G freq");
        let sp = job("#P HF/3-21G sp");

        assert_eq!(JobPlan::for_job(&sp, Some(&freq)), JobPlan::Single);
        assert_eq!(JobPlan::for_job(&opt, None), JobPlan::Optimize);
        assert_eq!(JobPlan::for_job(&opt, Some(&sp)), JobPlan::Optimize);
        assert_eq!(
            JobPlan::for_job(&opt, Some(&freq)),
            JobPlan::OptimizeAfterFrequency { frequency: &freq }
        );
    }

    #[test]
    fn test_abnormal_single_job_is_not_retried() {
        let mut orchestrator = Orchestrator::new(ScriptedEngine::new(vec![Ok(Abnormal)]), 8);
        let summary = orchestrator.run(&[job("#P HF/3-21G sp")]).unwrap();
        assert_eq!(summary.submissions, 1);
    }

    #[test]
    fn test_repeated_calcfc_restarts() {
        let engine = ScriptedEngine::new(vec![Ok(Abnormal), Ok(Abnormal), Ok(Abnormal), Ok(Normal)]);
        let mut orchestrator = Orchestrator::new(engine, 5);
        let summary = orchestrator.run(&[job("#P HF/3-21G opt")]).unwrap();
        assert_eq!(summary.submissions, 4);

        let submitted = &orchestrator.engine().submitted;
        for restart in &submitted[1..] {
            assert_eq!(
                restart.command,
                "#P HF/3-21G opt=(MaxCycles=5,CalcFC) Geom=AllCheck Guess=TCheck\n"
            );
        }
    }

    #[test]
    fn test_retry_limit() {
        let engine = ScriptedEngine::new(vec![Ok(Abnormal), Ok(Abnormal), Ok(Abnormal)]);
        let mut orchestrator = Orchestrator::new(engine, 8).with_max_retries(Some(2));
        match orchestrator.run(&[job("#P HF/3-21G opt")]) {
            Err(RunError::RetriesExhausted { job, attempts }) => {
                assert_eq!(job, 1);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(orchestrator.engine().submitted.len(), 3);
    }

    #[test]
    fn test_zero_retries_fails_after_first_slice() {
        let engine = ScriptedEngine::new(vec![Ok(Abnormal)]);
        let mut orchestrator = Orchestrator::new(engine, 8).with_max_retries(Some(0));
        assert!(matches!(
            orchestrator.run(&[job("#P HF/3-21G opt")]),
            Err(RunError::RetriesExhausted { attempts: 0, .. })
        ));
    }

    #[test]
    fn test_engine_error_is_fatal() {
        let engine = ScriptedEngine::new(vec![Err(1)]);
        let mut orchestrator = Orchestrator::new(engine, 8);
        let jobs = [job("#P HF/3-21G opt"), job("#P HF/3-21G sp")];
        match orchestrator.run(&jobs) {
            Err(RunError::Engine { job, source }) => {
                assert_eq!(job, 1);
                assert!(matches!(source, EngineError::ExitStatus { code: Some(1) }));
            }
            other => panic!("expected engine error, got {:?}", other),
        }
        assert_eq!(orchestrator.engine().submitted.len(), 1);
    }

    #[test]
    fn test_restart_skips_earlier_jobs() {
        let engine = ScriptedEngine::new(vec![Ok(Normal)]);
        let mut orchestrator = Orchestrator::new(engine, 8).with_restart_job(3);
        let jobs = [
            job("#P HF/3-21G opt"),
            job("#P HF/3-21G freq"),
            job("#P HF/3-21G sp"),
        ];
        let summary = orchestrator.run(&jobs).unwrap();
        assert_eq!(summary.jobs_skipped, 2);
        assert_eq!(summary.jobs_run, 1);
        assert_eq!(orchestrator.engine().submitted[0], jobs[2]);
    }

    #[test]
    fn test_restart_keeps_skipped_frequency_as_predecessor() {
        let engine = ScriptedEngine::new(vec![Ok(Abnormal), Ok(Normal), Ok(Normal)]);
        let mut orchestrator = Orchestrator::new(engine, 8).with_restart_job(2);
        let jobs = [job("#P HF/3-21G freq"), job("#P HF/3-21G opt")];
        orchestrator.run(&jobs).unwrap();

        let submitted = &orchestrator.engine().submitted;
        assert_eq!(submitted.len(), 3);
        assert_eq!(submitted[1].command, "#P HF/3-21G freq Geom=AllCheck Guess=TCheck\n");
    }

    #[test]
    fn test_restart_job_zero_and_one_run_everything() {
        for restart_job in [0, 1] {
            let engine = ScriptedEngine::new(vec![Ok(Normal), Ok(Normal)]);
            let mut orchestrator = Orchestrator::new(engine, 8).with_restart_job(restart_job);
            let jobs = [job("#P HF/3-21G sp"), job("#P HF/3-21G sp")];
            let summary = orchestrator.run(&jobs).unwrap();
            assert_eq!(summary.jobs_run, 2);
            assert_eq!(summary.jobs_skipped, 0);
        }
    }
}
