//! Plugin configuration and discovery of `rebase.config.json`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Default configuration file searched for next to the bundle entry.
pub const DEFAULT_CONFIG_FILE: &str = "rebase.config.json";

/// Patterns excluded by default: code modules handled by the bundler itself.
pub const DEFAULT_EXCLUDE: &[&str] = &[
  r"\.json$",
  r"\.mjs$",
  r"\.js$",
  r"\.jsx$",
  r"\.es$",
  r"\.esx$",
  r"\.ts$",
  r"\.tsx$",
  r"\.vue$",
];

/// Options recognised by [`crate::RebasePlugin`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RebaseConfig {
  /// Patterns an import specifier must match to be treated as an asset.
  pub include: Vec<String>,
  /// Patterns that veto asset handling. Defaults to [`DEFAULT_EXCLUDE`].
  pub exclude: Vec<String>,
  /// Emit a progress line for every copied or processed asset.
  pub verbose: bool,
  /// Prefix hashed file names with the original base name.
  pub keep_name: bool,
  /// Output sub folder (below the base directory) receiving all rebased assets.
  pub folder: String,
  /// Upper bound on concurrently materialised assets; unbounded when absent.
  pub concurrency: Option<usize>,
}

impl Default for RebaseConfig {
  fn default() -> Self {
    Self {
      include: Vec::new(),
      exclude: DEFAULT_EXCLUDE.iter().map(|pattern| pattern.to_string()).collect(),
      verbose: false,
      keep_name: false,
      folder: String::new(),
      concurrency: None,
    }
  }
}

impl RebaseConfig {
  /// Attempt to load configuration from the provided directory.
  ///
  /// Missing or malformed files fall back to the defaults.
  pub fn discover(dir: &Path) -> Self {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    Self::from_path(&candidate).unwrap_or_default()
  }

  /// Read configuration from a specific JSON file.
  pub fn from_path(path: &Path) -> Option<Self> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
      Ok(config) => Some(config),
      Err(err) => {
        tracing::warn!("ignoring malformed {}: {err}", path.display());
        None
      }
    }
  }

  /// Builder-style setter for [`RebaseConfig::folder`].
  pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
    self.folder = folder.into();
    self
  }

  /// Builder-style setter for [`RebaseConfig::keep_name`].
  pub fn with_keep_name(mut self, keep_name: bool) -> Self {
    self.keep_name = keep_name;
    self
  }

  /// Builder-style setter for [`RebaseConfig::verbose`].
  pub fn with_verbose(mut self, verbose: bool) -> Self {
    self.verbose = verbose;
    self
  }
}
