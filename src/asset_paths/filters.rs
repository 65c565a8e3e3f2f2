use std::path::Path;

use regex::Regex;

use crate::config::RebaseConfig;
use crate::error::{RebaseError, RebaseResult};

fn asset_reference_ignores() -> &'static [Regex] {
  use std::sync::OnceLock;

  static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
  PATTERNS
    .get_or_init(|| {
      vec![
        Regex::new(r"(?i)^[a-z][a-z0-9+.-]*://").expect("invalid url scheme regex"),
        Regex::new(r"^//").expect("invalid protocol-relative regex"),
        Regex::new(r"(?i)^data:").expect("invalid data URI regex"),
        Regex::new(r"(?i)^mailto:").expect("invalid mailto regex"),
        Regex::new(r"^#").expect("invalid fragment regex"),
      ]
    })
    .as_slice()
}

/// Determine whether a stylesheet reference points outside the local file tree.
///
/// Remote URLs, data URIs and fragment-only references are never rebased.
pub fn should_ignore_asset_reference(value: &str) -> bool {
  value.is_empty()
    || asset_reference_ignores()
      .iter()
      .any(|pattern| pattern.is_match(value))
}

/// Returns the extension of the last path segment including its dot, if any.
pub fn specifier_extension(specifier: &str) -> Option<&str> {
  let name = specifier.rsplit(['/', '\\']).next()?;
  let dot = name.rfind('.')?;
  // `.gitignore`-style names have a stem only
  if dot == 0 || dot + 1 == name.len() {
    return None;
  }
  Some(&name[dot..])
}

/// Include/exclude predicate deciding which import specifiers are assets.
#[derive(Debug, Clone)]
pub struct AssetFilter {
  include: Vec<Regex>,
  exclude: Vec<Regex>,
}

impl AssetFilter {
  /// Compile the include and exclude pattern lists.
  pub fn new<I, E>(include: I, exclude: E) -> RebaseResult<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
    E: IntoIterator,
    E::Item: AsRef<str>,
  {
    Ok(Self {
      include: compile_patterns(include)?,
      exclude: compile_patterns(exclude)?,
    })
  }

  /// Build the filter described by a plugin configuration.
  pub fn from_config(config: &RebaseConfig) -> RebaseResult<Self> {
    Self::new(&config.include, &config.exclude)
  }

  /// Returns `true` when the specifier should be rebased as an asset.
  pub fn matches(&self, specifier: &str) -> bool {
    if specifier_extension(specifier).is_none() {
      return false;
    }

    let candidate = specifier.replace('\\', "/");
    if self.exclude.iter().any(|pattern| pattern.is_match(&candidate)) {
      return false;
    }

    self.include.is_empty() || self.include.iter().any(|pattern| pattern.is_match(&candidate))
  }

  /// Path-based convenience wrapper around [`AssetFilter::matches`].
  pub fn matches_path(&self, path: &Path) -> bool {
    self.matches(&path.to_string_lossy())
  }
}

impl Default for AssetFilter {
  fn default() -> Self {
    // the default patterns are static and known to compile
    Self::from_config(&RebaseConfig::default()).expect("invalid default exclude pattern")
  }
}

fn compile_patterns<P>(patterns: P) -> RebaseResult<Vec<Regex>>
where
  P: IntoIterator,
  P::Item: AsRef<str>,
{
  patterns
    .into_iter()
    .map(|pattern| {
      let pattern = pattern.as_ref();
      Regex::new(pattern).map_err(|source| RebaseError::Pattern {
        pattern: pattern.to_string(),
        source,
      })
    })
    .collect()
}
