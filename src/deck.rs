//! Gaussian input deck parsing.
//!
//! A deck holds one or more jobs separated by `--Link1--` lines. Each job is
//! read line by line into the five sections of a [`Job`]:
//!
//! 1. **Preamble**: everything before the route line (`#`, `#P`, `#N` or `#T`
//!    followed by a space).
//! 2. **Command**: the route line and its continuation lines, up to the first
//!    blank line.
//! 3. **Annotation**: the blank line ending the route, the title section, the
//!    blank line ending the title and the charge/multiplicity line.
//! 4. **Geometry**: the molecule specification, up to the next blank line.
//! 5. **Trailer**: everything else, up to (not including) the next `--Link1--`
//!    line or the end of input.
//!
//! Steps 3 and 4 are skipped when the route reads the geometry from the
//! checkpoint file (`Geom=Check`, `Geom=AllCheck`).
//!
//! Nothing is normalized: concatenating the sections of all parsed jobs
//! reproduces the deck byte for byte.
//!
//! # Examples
//!
//! ```
//! use gopt::deck::parse_deck;
//!
//! let deck = "%chk=h2.chk\n#P HF/STO-3G opt\n\nH2\n\n0 1\nH 0 0 0\nH 0 0 0.74\n\n\
//!             --Link1--\n%chk=h2.chk\n#P HF/STO-3G freq geom=check\n\n";
//! let jobs = parse_deck(deck).unwrap();
//! assert_eq!(jobs.len(), 2);
//! assert!(jobs[0].is_optimization());
//! assert!(jobs[1].annotation.is_empty());
//! assert_eq!(jobs.iter().map(|job| job.to_string()).collect::<String>(), deck);
//! ```

use crate::job::Job;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Error type for deck parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O error when reading the deck
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The deck ended in the middle of a job
    #[error("Unexpected end of file found: {line} (while reading {section})")]
    Structural {
        /// 1-based number of the line that was expected but missing
        line: usize,
        /// Section of the job being read when input ran out
        section: &'static str,
    },
}

/// Type alias for parse operation results
type Result<T> = std::result::Result<T, ParseError>;

lazy_static! {
    // Route line: "#", "#P", "#N" or "#T" followed by a space
    static ref COMMAND_RE: Regex = Regex::new(r"^\s*#[PNTpnt]?[ \t]").unwrap();

    // Job separator: "--Link1--" alone on its line
    static ref LINK_RE: Regex = Regex::new(r"(?i)^\s*--link1--\s*$").unwrap();
}

/// Forward-only line reader that counts lines and can push lines back.
struct LineCursor<R> {
    reader: R,
    line: usize,
    pushed_back: Vec<String>,
}

impl<R: BufRead> LineCursor<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            pushed_back: Vec::new(),
        }
    }

    /// Reads the next line including its terminator, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>> {
        self.line += 1;
        if let Some(line) = self.pushed_back.pop() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    /// Reads a line that must exist.
    fn require_line(&mut self, section: &'static str) -> Result<String> {
        self.next_line()?.ok_or(ParseError::Structural {
            line: self.line,
            section,
        })
    }

    /// Returns `line` to the cursor; the next read yields it again.
    fn push_back(&mut self, line: String) {
        self.line -= 1;
        self.pushed_back.push(line);
    }

    /// True if no line is left. Does not advance the cursor.
    fn at_end(&mut self) -> Result<bool> {
        if !self.pushed_back.is_empty() {
            return Ok(false);
        }
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(true);
        }
        self.pushed_back.push(buf);
        Ok(false)
    }
}

/// Parser position within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Command,
    Title,
    ChargeMultiplicity,
    Geometry,
    Trailer,
}

impl Section {
    fn describe(self) -> &'static str {
        match self {
            Section::Preamble => "link 0 commands",
            Section::Command => "route section",
            Section::Title => "title section",
            Section::ChargeMultiplicity => "charge and multiplicity",
            Section::Geometry => "molecule specification",
            Section::Trailer => "trailing input",
        }
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Reads jobs one at a time from a deck.
///
/// Implements [`Iterator`] over `Result<Job, ParseError>`; iteration stops
/// after the first error.
pub struct DeckReader<R> {
    cursor: LineCursor<R>,
    failed: bool,
}

impl<R: BufRead> DeckReader<R> {
    /// Creates a reader over any buffered line source.
    pub fn new(reader: R) -> Self {
        Self {
            cursor: LineCursor::new(reader),
            failed: false,
        }
    }

    /// Reads the next job, or `None` when the deck is exhausted.
    pub fn next_job(&mut self) -> Result<Option<Job>> {
        let Some(mut line) = self.cursor.next_line()? else {
            return Ok(None);
        };
        let mut job = Job::default();
        let mut section = Section::Preamble;

        loop {
            section = match section {
                Section::Preamble if COMMAND_RE.is_match(&line) => {
                    job.command.push_str(&line);
                    Section::Command
                }
                Section::Preamble => {
                    job.preamble.push_str(&line);
                    Section::Preamble
                }
                Section::Command if !is_blank(&line) => {
                    job.command.push_str(&line);
                    Section::Command
                }
                Section::Command if job.reads_checkpoint_geometry() => {
                    job.trailer.push_str(&line);
                    Section::Trailer
                }
                Section::Command => {
                    job.annotation.push_str(&line);
                    Section::Title
                }
                Section::Title => {
                    job.annotation.push_str(&line);
                    if is_blank(&line) {
                        Section::ChargeMultiplicity
                    } else {
                        Section::Title
                    }
                }
                Section::ChargeMultiplicity => {
                    job.annotation.push_str(&line);
                    Section::Geometry
                }
                Section::Geometry if is_blank(&line) => {
                    job.trailer.push_str(&line);
                    Section::Trailer
                }
                Section::Geometry => {
                    job.geometry.push_str(&line);
                    Section::Geometry
                }
                // A separator on the last line closes the deck
                Section::Trailer if LINK_RE.is_match(&line) && self.cursor.at_end()? => {
                    job.trailer.push_str(&line);
                    Section::Trailer
                }
                Section::Trailer if LINK_RE.is_match(&line) => {
                    self.cursor.push_back(line);
                    break;
                }
                Section::Trailer => {
                    job.trailer.push_str(&line);
                    Section::Trailer
                }
            };

            line = if section == Section::Trailer {
                match self.cursor.next_line()? {
                    Some(line) => line,
                    None => break,
                }
            } else {
                self.cursor.require_line(section.describe())?
            };
        }

        debug!(
            "Parsed {} job ending at line {} ({} lines): {}",
            job.kind(),
            self.cursor.line,
            job.to_string().lines().count(),
            job.summary()
        );
        Ok(Some(job))
    }
}

impl<R: BufRead> Iterator for DeckReader<R> {
    type Item = Result<Job>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_job() {
            Ok(job) => job.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Parses every job of a deck held in memory.
pub fn parse_deck(text: &str) -> Result<Vec<Job>> {
    DeckReader::new(text.as_bytes()).collect()
}

/// Reads and parses every job of the deck at `path`.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read and
/// [`ParseError::Structural`] if it ends in the middle of a job.
pub fn read_deck(path: &Path) -> Result<Vec<Job>> {
    let file = File::open(path)?;
    DeckReader::new(BufReader::new(file)).collect()
}
