//! Structured view of a Gaussian route section.
//!
//! The route section (the `#P ...` line or lines) drives everything the
//! optimization driver decides about a job. Instead of matching regular
//! expressions against the raw text, the route is split into whitespace
//! separated words, each of which can be viewed as a [`Keyword`] with an
//! option list:
//!
//! ```text
//! #P B3LYP/6-31G(d) opt=(CalcFC,MaxCycles=20) geom=check
//! ^^ ^^^^^^^^^^^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^^
//! word  word              keyword + options       keyword + option
//! ```
//!
//! Every word remembers the whitespace that preceded it, so a route that is
//! never edited serializes back to exactly the text it was parsed from.
//! Edits replace or remove whole words and leave the rest untouched.
//!
//! # Examples
//!
//! ```
//! use gopt::route::{ForceConstants, Route};
//!
//! let mut route = Route::parse("#P B3LYP/6-31G(d) opt=(MaxCycles=50)\n");
//! assert!(route.is_optimization());
//!
//! route.set_max_cycles(8).unwrap();
//! route.set_force_constants(ForceConstants::Read).unwrap();
//! assert_eq!(route.to_string(), "#P B3LYP/6-31G(d) opt=(MaxCycles=8,ReadFC)\n");
//! ```

use std::fmt;
use thiserror::Error;

/// Error type for route edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// An optimization option was requested on a route without an `opt` keyword
    #[error("Not an optimization: {0}")]
    NotAnOptimization(String),
}

/// Type alias for route edit results
type Result<T> = std::result::Result<T, RouteError>;

const OPT_KEYWORD: &str = "opt";
const FREQ_KEYWORD: &str = "freq";
const GEOM_KEYWORD: &str = "geom";
const GUESS_KEYWORD: &str = "guess";
const MAX_CYCLES_OPTION: &str = "maxcycles";

/// Every spelling of a force-constant source understood by `opt`.
const FORCE_CONSTANT_OPTIONS: [&str; 4] = ["readfc", "calcfc", "calchffc", "rcfc"];

/// Keywords appended when a job is switched to checkpoint geometry.
const CHECKPOINT_KEYWORDS: [&str; 2] = ["Geom=AllCheck", "Guess=TCheck"];

/// Where an optimization obtains its initial Hessian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceConstants {
    /// Compute force constants at the first point (`CalcFC`)
    Calculate,
    /// Read force constants from the checkpoint file (`ReadFC`)
    Read,
}

impl ForceConstants {
    /// Returns the `opt` option spelling of this source.
    pub fn as_option(self) -> &'static str {
        match self {
            ForceConstants::Calculate => "CalcFC",
            ForceConstants::Read => "ReadFC",
        }
    }
}

/// A single keyword of the route section together with its options.
///
/// `opt=(CalcFC,MaxCycles=8)`, `opt(CalcFC)` and `opt=CalcFC` all parse to
/// the keyword `opt` with the options they list. Option text is kept as
/// written (`MaxCycles=8` stays one option).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Keyword name as written (e.g. `opt`, `Geom`, `B3LYP/6-31G`)
    pub name: String,
    /// Options in the order they were written
    pub options: Vec<String>,
}

impl Keyword {
    /// Parses one route word.
    pub fn parse(word: &str) -> Self {
        let split = word.find(['=', '(']).unwrap_or(word.len());
        let name = word[..split].to_string();
        let rest = word[split..].strip_prefix('=').unwrap_or(&word[split..]);

        let options = match rest.strip_prefix('(') {
            Some(list) => {
                let list = list.strip_suffix(')').unwrap_or(list);
                list.split(',')
                    .map(str::trim)
                    .filter(|option| !option.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            None if rest.is_empty() => Vec::new(),
            None => vec![rest.to_string()],
        };

        Self { name, options }
    }

    /// Returns true if the keyword name matches `name`, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Returns true if any option's name (the part before `=`) matches `name`,
    /// ignoring case.
    pub fn has_option(&self, name: &str) -> bool {
        self.options
            .iter()
            .any(|option| option_name(option).eq_ignore_ascii_case(name))
    }

    /// Removes every option whose name matches one of `names`, ignoring case.
    pub fn remove_options(&mut self, names: &[&str]) {
        self.options.retain(|option| {
            let option = option_name(option);
            !names.iter().any(|name| option.eq_ignore_ascii_case(name))
        });
    }
}

impl fmt::Display for Keyword {
    /// Serializes as `name` or `name=(opt1,opt2)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.options.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}=({})", self.name, self.options.join(","))
        }
    }
}

fn option_name(option: &str) -> &str {
    option.split('=').next().unwrap_or(option).trim()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    leading: String,
    text: String,
}

/// A route section split into words.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    words: Vec<Word>,
    trailing: String,
}

impl Route {
    /// Splits route text into words.
    ///
    /// Whitespace inside parentheses does not end a word, so
    /// `opt=(CalcFC, MaxCycles=8)` is a single word. Parsing never fails;
    /// unbalanced parentheses simply extend the word to the end of the text.
    pub fn parse(text: &str) -> Self {
        let mut words = Vec::new();
        let mut leading = String::new();
        let mut current = String::new();
        let mut depth = 0usize;

        for c in text.chars() {
            if c.is_whitespace() && depth == 0 {
                if !current.is_empty() {
                    words.push(Word {
                        leading: std::mem::take(&mut leading),
                        text: std::mem::take(&mut current),
                    });
                }
                leading.push(c);
                continue;
            }
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            current.push(c);
        }

        if !current.is_empty() {
            words.push(Word {
                leading: std::mem::take(&mut leading),
                text: current,
            });
        }

        Self {
            words,
            trailing: leading,
        }
    }

    /// Iterates over all route words viewed as keywords.
    pub fn keywords(&self) -> impl Iterator<Item = Keyword> + '_ {
        self.words.iter().map(|word| Keyword::parse(&word.text))
    }

    /// Returns the first keyword named `name`, ignoring case.
    pub fn keyword(&self, name: &str) -> Option<Keyword> {
        self.keywords().find(|keyword| keyword.is(name))
    }

    /// True if the route requests a geometry optimization.
    pub fn is_optimization(&self) -> bool {
        self.keyword(OPT_KEYWORD).is_some()
    }

    /// True if the route requests a frequency calculation.
    pub fn is_frequency(&self) -> bool {
        self.keyword(FREQ_KEYWORD).is_some()
    }

    /// True if the geometry is read from the checkpoint file
    /// (`Geom=Check`, `Geom=AllCheck`, ...), in which case the job carries no
    /// title, charge/multiplicity or molecule specification.
    pub fn reads_checkpoint_geometry(&self) -> bool {
        self.keywords().filter(|keyword| keyword.is(GEOM_KEYWORD)).any(|keyword| {
            keyword
                .options
                .iter()
                .any(|option| option.to_ascii_lowercase().ends_with("check"))
        })
    }

    /// Sets `MaxCycles=<cycles>` on the `opt` keyword, replacing any
    /// existing value.
    pub fn set_max_cycles(&mut self, cycles: u32) -> Result<()> {
        self.edit_opt(|opt| {
            opt.remove_options(&[MAX_CYCLES_OPTION]);
            opt.options.push(format!("MaxCycles={}", cycles));
        })
    }

    /// Sets the force-constant source on the `opt` keyword. Any other
    /// force-constant option (`ReadFC`, `CalcFC`, `CalcHFFC`, `RCFC`) is
    /// removed first, so at most one is present afterwards.
    pub fn set_force_constants(&mut self, source: ForceConstants) -> Result<()> {
        self.edit_opt(|opt| {
            opt.remove_options(&FORCE_CONSTANT_OPTIONS);
            opt.options.push(source.as_option().to_string());
        })
    }

    /// Replaces every `Geom=` and `Guess=` keyword with
    /// `Geom=AllCheck Guess=TCheck` at the end of the route.
    ///
    /// Removed words take their preceding whitespace with them, and the route
    /// ends with a single line break afterwards, `\r\n` if the route used it.
    pub fn use_checkpoint_geometry(&mut self) {
        let line_ending = if self.to_string().contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        };
        self.words.retain(|word| {
            let keyword = Keyword::parse(&word.text);
            !keyword.is(GEOM_KEYWORD) && !keyword.is(GUESS_KEYWORD)
        });
        for text in CHECKPOINT_KEYWORDS {
            self.words.push(Word {
                leading: " ".to_string(),
                text: text.to_string(),
            });
        }
        self.trailing = line_ending.to_string();
    }

    fn edit_opt(&mut self, edit: impl FnOnce(&mut Keyword)) -> Result<()> {
        let word = self
            .words
            .iter_mut()
            .find(|word| Keyword::parse(&word.text).is(OPT_KEYWORD));

        match word {
            Some(word) => {
                let mut opt = Keyword::parse(&word.text);
                edit(&mut opt);
                word.text = opt.to_string();
                Ok(())
            }
            None => Err(RouteError::NotAnOptimization(self.to_string().trim().to_string())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.words {
            write!(f, "{}{}", word.leading, word.text)?;
        }
        write!(f, "{}", self.trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unedited_route_round_trips() {
        let texts = [
            "#P B3LYP/6-31G(d) opt freq\n",
            "  #T  HF/STO-3G   opt=(calcfc, maxcycles=5)\n  geom=check guess=read\n",
            "# opt",
            "#N MP2/cc-pVTZ scf=(xqc,maxcycle=512) \n\n",
        ];
        for text in texts {
            assert_eq!(Route::parse(text).to_string(), text);
        }
    }

    #[test]
    fn test_keyword_forms() {
        assert_eq!(
            Keyword::parse("opt=(CalcFC,MaxCycles=8)").options,
            vec!["CalcFC", "MaxCycles=8"]
        );
        assert_eq!(Keyword::parse("opt(ReadFC)").options, vec!["ReadFC"]);
        assert_eq!(Keyword::parse("opt=tight").options, vec!["tight"]);
        assert!(Keyword::parse("opt").options.is_empty());
        assert_eq!(Keyword::parse("Opt=(z-matrix)").name, "Opt");
    }

    #[test]
    fn test_classification() {
        let route = Route::parse("#P B3LYP/6-31G(d) Opt=(ts,noeigentest) Freq\n");
        assert!(route.is_optimization());
        assert!(route.is_frequency());

        let route = Route::parse("#P B3LYP/6-31G(d) freq=noraman optcyc\n");
        assert!(!route.is_optimization());
        assert!(route.is_frequency());

        let route = Route::parse("#P B3LYP/6-31G(d) sp frequent\n");
        assert!(!route.is_optimization());
        assert!(!route.is_frequency());
    }

    #[test]
    fn test_checkpoint_geometry_detection() {
        assert!(Route::parse("#P freq geom=allcheck\n").reads_checkpoint_geometry());
        assert!(Route::parse("#P freq Geom=Check\n").reads_checkpoint_geometry());
        assert!(Route::parse("#P freq geom=(check,modredundant)\n").reads_checkpoint_geometry());
        assert!(!Route::parse("#P freq geom=connectivity\n").reads_checkpoint_geometry());
        assert!(!Route::parse("#P freq guess=check\n").reads_checkpoint_geometry());
    }

    #[test]
    fn test_set_max_cycles_replaces_existing() {
        let mut route = Route::parse("#P opt=(maxcycles=100,tight) freq\n");
        route.set_max_cycles(8).unwrap();
        assert_eq!(route.to_string(), "#P opt=(tight,MaxCycles=8) freq\n");
    }

    #[test]
    fn test_set_max_cycles_on_bare_opt() {
        let mut route = Route::parse("#P HF/3-21G opt\n");
        route.set_max_cycles(3).unwrap();
        assert_eq!(route.to_string(), "#P HF/3-21G opt=(MaxCycles=3)\n");
    }

    #[test]
    fn test_force_constants_are_exclusive() {
        let mut route = Route::parse("#P opt=(ReadFC,CalcHFFC,RCFC,tight)\n");
        route.set_force_constants(ForceConstants::Calculate).unwrap();
        let opt = route.keyword("opt").unwrap();
        assert_eq!(opt.options, vec!["tight", "CalcFC"]);

        route.set_force_constants(ForceConstants::Read).unwrap();
        let opt = route.keyword("opt").unwrap();
        assert!(opt.has_option("readfc"));
        assert!(!opt.has_option("calcfc"));
    }

    #[test]
    fn test_opt_edit_requires_opt_keyword() {
        let mut route = Route::parse("#P B3LYP/6-31G(d) freq\n");
        assert!(matches!(
            route.set_max_cycles(8),
            Err(RouteError::NotAnOptimization(_))
        ));
        assert_eq!(route.to_string(), "#P B3LYP/6-31G(d) freq\n");
    }

    #[test]
    fn test_use_checkpoint_geometry() {
        let mut route = Route::parse("#P freq geom=check\n guess=read\n");
        route.use_checkpoint_geometry();
        assert_eq!(route.to_string(), "#P freq Geom=AllCheck Guess=TCheck\n");
        assert!(route.reads_checkpoint_geometry());
    }

    #[test]
    fn test_use_checkpoint_geometry_keeps_crlf() {
        let mut route = Route::parse("#P freq geom=check\r\n scf=tight\r\n");
        route.use_checkpoint_geometry();
        assert_eq!(
            route.to_string(),
            "#P freq\r\n scf=tight Geom=AllCheck Guess=TCheck\r\n"
        );
    }
}
