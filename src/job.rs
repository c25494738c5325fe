//! Gaussian job records and derived jobs.
//!
//! A [`Job`] is one job of a multi-job input deck, split into the five text
//! sections the deck parser recognizes. Each section is kept verbatim,
//! including its line endings, so that printing an unmodified job yields
//! exactly the text it was parsed from:
//!
//! ```text
//! %chk=water.chk            <- preamble (Link 0 commands)
//! %nproc=4
//! #P B3LYP/6-31G(d) opt     <- command (route section)
//!                           <- annotation: blank line,
//! water optimization        <-   title section,
//!                           <-   blank line,
//! 0 1                       <-   charge and multiplicity
//! O  0.000  0.000  0.117    <- geometry (molecule specification)
//! H  0.000  0.757 -0.467
//! H  0.000 -0.757 -0.467
//!                           <- trailer: everything up to the next --Link1--
//! ```
//!
//! Jobs are never modified in place. The orchestrator submits *derived* jobs
//! built with [`Job::derive`] (or one of its shorthands), which copy the job
//! and edit the route through [`Route`](crate::route::Route).

use crate::route::{ForceConstants, Route, RouteError};
use std::fmt;

/// One job of a Gaussian input deck.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Job {
    /// Link 0 commands and anything else before the route section
    pub preamble: String,
    /// Route section (`#P ...`), possibly spanning several lines
    pub command: String,
    /// Blank line, title section, blank line and charge/multiplicity line;
    /// empty when the geometry comes from the checkpoint file
    pub annotation: String,
    /// Molecule specification; empty when the geometry comes from the
    /// checkpoint file
    pub geometry: String,
    /// Remaining input up to the next job separator
    pub trailer: String,
}

/// Coarse classification of a job, used for logging and planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Geometry optimization (possibly also requesting frequencies)
    Optimization,
    /// Frequency calculation without optimization
    Frequency,
    /// Anything else (single points, properties, ...)
    Other,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Optimization => "optimization",
            JobKind::Frequency => "frequency",
            JobKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Set of edits applied when deriving a job.
///
/// # Examples
///
/// ```
/// use gopt::job::{Derivation, Job};
/// use gopt::route::ForceConstants;
///
/// let job = Job {
///     command: "#P HF/3-21G opt\n".to_string(),
///     ..Job::default()
/// };
/// let restart = job
///     .derive(
///         &Derivation::new()
///             .checkpoint_geometry()
///             .opt_steps(8)
///             .force_constants(ForceConstants::Calculate),
///     )
///     .unwrap();
/// assert_eq!(
///     restart.command,
///     "#P HF/3-21G opt=(MaxCycles=8,CalcFC) Geom=AllCheck Guess=TCheck\n"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Derivation {
    checkpoint_geometry: bool,
    opt_steps: Option<u32>,
    force_constants: Option<ForceConstants>,
}

impl Derivation {
    /// Creates an empty derivation (an exact copy of the job).
    pub fn new() -> Self {
        Self::default()
    }

    /// Read geometry and initial guess from the checkpoint file.
    pub fn checkpoint_geometry(mut self) -> Self {
        self.checkpoint_geometry = true;
        self
    }

    /// Limit the optimization to `steps` cycles.
    pub fn opt_steps(mut self, steps: u32) -> Self {
        self.opt_steps = Some(steps);
        self
    }

    /// Choose where the optimization gets its force constants.
    pub fn force_constants(mut self, source: ForceConstants) -> Self {
        self.force_constants = Some(source);
        self
    }

    fn edits_opt(&self) -> bool {
        self.opt_steps.is_some() || self.force_constants.is_some()
    }
}

impl Job {
    /// Parses the route section of this job.
    pub fn route(&self) -> Route {
        Route::parse(&self.command)
    }

    /// True if the route requests a geometry optimization.
    pub fn is_optimization(&self) -> bool {
        self.route().is_optimization()
    }

    /// True if the route requests a frequency calculation.
    pub fn is_frequency(&self) -> bool {
        self.route().is_frequency()
    }

    /// True if the route reads the geometry from the checkpoint file.
    pub fn reads_checkpoint_geometry(&self) -> bool {
        self.route().reads_checkpoint_geometry()
    }

    /// Classifies the job. Optimization takes precedence over frequency.
    pub fn kind(&self) -> JobKind {
        let route = self.route();
        if route.is_optimization() {
            JobKind::Optimization
        } else if route.is_frequency() {
            JobKind::Frequency
        } else {
            JobKind::Other
        }
    }

    /// Builds a new job from this one with the given edits applied.
    ///
    /// Returns [`RouteError::NotAnOptimization`] if optimization options are
    /// requested for a job without an `opt` keyword; in that case nothing is
    /// built.
    pub fn derive(&self, derivation: &Derivation) -> Result<Job, RouteError> {
        let mut route = self.route();

        if derivation.edits_opt() && !route.is_optimization() {
            return Err(RouteError::NotAnOptimization(self.command.trim().to_string()));
        }
        if let Some(steps) = derivation.opt_steps {
            route.set_max_cycles(steps)?;
        }
        if let Some(source) = derivation.force_constants {
            route.set_force_constants(source)?;
        }

        let mut job = Job {
            command: route.to_string(),
            ..self.clone()
        };
        if derivation.checkpoint_geometry {
            route.use_checkpoint_geometry();
            job.command = route.to_string();
            job.annotation.clear();
            job.geometry.clear();
        }
        Ok(job)
    }

    /// Copy of this job limited to `steps` optimization cycles.
    pub fn with_opt_steps(&self, steps: u32) -> Result<Job, RouteError> {
        self.derive(&Derivation::new().opt_steps(steps))
    }

    /// Copy of this job using the given force-constant source.
    pub fn with_force_constants(&self, source: ForceConstants) -> Result<Job, RouteError> {
        self.derive(&Derivation::new().force_constants(source))
    }

    /// Copy of this job that reads geometry and guess from the checkpoint.
    pub fn with_checkpoint_geometry(&self) -> Job {
        let mut route = self.route();
        route.use_checkpoint_geometry();
        Job {
            command: route.to_string(),
            annotation: String::new(),
            geometry: String::new(),
            ..self.clone()
        }
    }

    /// Short single-line description of the route for log messages.
    pub fn summary(&self) -> String {
        self.command.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for Job {
    /// Writes the job as Gaussian input, sections in deck order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preamble)?;
        f.write_str(&self.command)?;
        f.write_str(&self.annotation)?;
        f.write_str(&self.geometry)?;
        f.write_str(&self.trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_opt() -> Job {
        Job {
            preamble: "%chk=water.chk\n".to_string(),
            command: "#P B3LYP/6-31G(d) opt\n".to_string(),
            annotation: "\nwater\n\n0 1\n".to_string(),
            geometry: "O 0.0 0.0 0.1\nH 0.0 0.7 -0.4\nH 0.0 -0.7 -0.4\n".to_string(),
            trailer: "\n".to_string(),
        }
    }

    #[test]
    fn test_display_concatenates_sections() {
        let job = water_opt();
        assert_eq!(
            job.to_string(),
            "%chk=water.chk\n#P B3LYP/6-31G(d) opt\n\nwater\n\n0 1\n\
             O 0.0 0.0 0.1\nH 0.0 0.7 -0.4\nH 0.0 -0.7 -0.4\n\n"
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(water_opt().kind(), JobKind::Optimization);

        let freq = Job {
            command: "#P B3LYP/6-31G(d) freq geom=check\n".to_string(),
            ..Job::default()
        };
        assert_eq!(freq.kind(), JobKind::Frequency);
        assert!(freq.reads_checkpoint_geometry());

        let sp = Job {
            command: "#P B3LYP/6-31G(d) pop=full\n".to_string(),
            ..Job::default()
        };
        assert_eq!(sp.kind(), JobKind::Other);
    }

    #[test]
    fn test_with_opt_steps_keeps_other_sections() {
        let job = water_opt();
        let derived = job.with_opt_steps(8).unwrap();
        assert_eq!(derived.command, "#P B3LYP/6-31G(d) opt=(MaxCycles=8)\n");
        assert_eq!(derived.preamble, job.preamble);
        assert_eq!(derived.annotation, job.annotation);
        assert_eq!(derived.geometry, job.geometry);
        assert_eq!(derived.trailer, job.trailer);
        // the source job is untouched
        assert_eq!(job.command, "#P B3LYP/6-31G(d) opt\n");
    }

    #[test]
    fn test_checkpoint_switch_clears_molecule() {
        let derived = water_opt().with_checkpoint_geometry();
        assert!(derived.annotation.is_empty());
        assert!(derived.geometry.is_empty());
        assert!(derived.reads_checkpoint_geometry());
        assert_eq!(derived.preamble, "%chk=water.chk\n");
    }

    #[test]
    fn test_force_constant_rewrite_exclusive() {
        let job = Job {
            command: "#P opt=(ReadFC) freq\n".to_string(),
            ..Job::default()
        };
        let calc = job.with_force_constants(ForceConstants::Calculate).unwrap();
        let lower = calc.command.to_lowercase();
        assert!(lower.contains("calcfc"));
        assert!(!lower.contains("readfc"));

        let read = calc.with_force_constants(ForceConstants::Read).unwrap();
        let lower = read.command.to_lowercase();
        assert!(lower.contains("readfc"));
        assert!(!lower.contains("calcfc"));
    }

    #[test]
    fn test_opt_steps_on_non_optimization_fails() {
        let job = Job {
            command: "#P B3LYP/6-31G(d) freq\n".to_string(),
            ..Job::default()
        };
        assert!(matches!(
            job.with_opt_steps(8),
            Err(RouteError::NotAnOptimization(_))
        ));
        assert!(job
            .derive(&Derivation::new().checkpoint_geometry().force_constants(ForceConstants::Read))
            .is_err());
    }

    #[test]
    fn test_empty_derivation_is_identity() {
        let job = water_opt();
        assert_eq!(job.derive(&Derivation::new()).unwrap(), job);
    }
}
