//! Error taxonomy surfaced to the host bundler.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by every bundler-facing hook.
pub type RebaseResult<T> = Result<T, RebaseError>;

/// Errors produced while rebasing assets.
#[derive(Debug, Error)]
pub enum RebaseError {
  /// The bundle's entry configuration could not be interpreted.
  #[error("{0}")]
  Config(String),
  /// An include or exclude pattern is not a valid regular expression.
  #[error("invalid asset pattern `{pattern}`")]
  Pattern {
    /// Pattern as written in the configuration.
    pattern: String,
    /// Underlying regex error.
    #[source]
    source: regex::Error,
  },
  /// A referenced asset could not be located or hashed.
  #[error("failed to resolve asset `{importee}` imported from {}", importer.display())]
  Resolve {
    /// Specifier as written in the importing module.
    importee: String,
    /// Module containing the import.
    importer: PathBuf,
    /// Underlying failure.
    #[source]
    source: anyhow::Error,
  },
  /// One or more assets failed to copy or transform during emission.
  #[error("error while copying files: {}", format_failures(failed))]
  Materialize {
    /// Source paths of every job that failed.
    failed: Vec<PathBuf>,
    /// First failure encountered.
    #[source]
    source: anyhow::Error,
  },
  /// Filesystem failure outside of a specific asset job.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

fn format_failures(failed: &[PathBuf]) -> String {
  failed
    .iter()
    .map(|path| path.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}
