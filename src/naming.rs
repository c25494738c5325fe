//! File naming derived from the input deck path.
//!
//! Every submission of a run appends to one log whose name follows the deck:
//! the deck's extension is replaced by `.out` and the directory is kept.
//!
//! # Example
//!
//! ```
//! use std::path::{Path, PathBuf};
//! use gopt::naming::FileNaming;
//!
//! let naming = FileNaming::new(Path::new("runs/ethanol.com"));
//! assert_eq!(naming.output_log(), PathBuf::from("runs/ethanol.out"));
//! ```

use std::path::{Path, PathBuf};

/// Extension of the shared engine log.
pub const OUTPUT_EXTENSION: &str = "out";

/// Names the files of a run after its input deck.
#[derive(Debug, Clone)]
pub struct FileNaming {
    input: PathBuf,
}

impl FileNaming {
    /// Creates a FileNaming instance from an input deck path.
    pub fn new(input_path: &Path) -> Self {
        Self {
            input: input_path.to_path_buf(),
        }
    }

    /// Returns the path of the shared engine log.
    ///
    /// Format: `{dir}/{deck stem}.out`
    pub fn output_log(&self) -> PathBuf {
        self.input.with_extension(OUTPUT_EXTENSION)
    }

    /// True if the deck itself would be used as the log.
    pub fn log_collides_with_input(&self) -> bool {
        self.output_log() == self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_log_replaces_extension() {
        let naming = FileNaming::new(Path::new("water.gjf"));
        assert_eq!(naming.output_log(), PathBuf::from("water.out"));
    }

    #[test]
    fn test_output_log_without_extension() {
        let naming = FileNaming::new(Path::new("water"));
        assert_eq!(naming.output_log(), PathBuf::from("water.out"));
    }

    #[test]
    fn test_output_log_keeps_directory() {
        let naming = FileNaming::new(Path::new("/scratch/user/ts_search.g"));
        assert_eq!(
            naming.output_log(),
            PathBuf::from("/scratch/user/ts_search.out")
        );
    }

    #[test]
    fn test_only_last_extension_replaced() {
        let naming = FileNaming::new(Path::new("mol.v2.com"));
        assert_eq!(naming.output_log(), PathBuf::from("mol.v2.out"));
    }

    #[test]
    fn test_collision_detection() {
        assert!(FileNaming::new(Path::new("deck.out")).log_collides_with_input());
        assert!(!FileNaming::new(Path::new("deck.com")).log_collides_with_input());
    }
}
