//! Minimal single-entry host driving a [`BundlerPlugin`] through one build.
//!
//! The host only follows the static imports of the entry module. Imports the plugin leaves
//! unhandled are kept verbatim; code bundling is out of scope.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::anyhow;
use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::asset_paths::{enforce_dot_slash, output_destination, to_forward_slashes};
use crate::error::{RebaseError, RebaseResult};
use crate::models::{EntryInputs, ResolveOutcome};
use crate::plugin::BundlerPlugin;

/// Import specifier rewritten while bundling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
  /// Specifier as written in the entry module.
  pub specifier: String,
  /// Asset id the wrapper module re-exports.
  pub asset_id: String,
  /// Specifier written to the output file, relative to its directory.
  pub emitted_as: String,
}

/// Result of [`bundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
  /// File the rewritten entry module was written to.
  pub output_file: PathBuf,
  /// Rewritten imports ordered by specifier.
  pub rewrites: Vec<Rewrite>,
}

fn import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(\bimport\s+(?:[\w$*{}\s,]+?\s+from\s+)?|\bfrom\s+)(["'])([^"'\n]+)(["'])"#)
      .expect("invalid import regex")
  })
}

fn reexport_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"^export\s*\{\s*default\s*\}\s*from\s*("(?:[^"\\]|\\.)*")\s*;?\s*$"#)
      .expect("invalid re-export regex")
  })
}

/// Static import specifiers of a module, without duplicates.
pub fn import_specifiers(source: &str) -> Vec<String> {
  let mut specifiers: Vec<String> = Vec::new();
  for caps in import_pattern().captures_iter(source) {
    let specifier = caps[3].to_string();
    if !specifiers.contains(&specifier) {
      specifiers.push(specifier);
    }
  }
  specifiers
}

/// Asset id re-exported by a wrapper module's source.
pub fn reexported_id(wrapper_source: &str) -> Option<String> {
  let caps = reexport_pattern().captures(wrapper_source.trim())?;
  serde_json::from_str(&caps[1]).ok()
}

/// Run one build of `entry` through `plugin`, writing the result to `output_file`.
pub async fn bundle<P: BundlerPlugin>(plugin: &P, entry: &Path, output_file: &Path) -> RebaseResult<BundleReport> {
  info!("{}: bundling {} into {}", plugin.name(), entry.display(), output_file.display());
  plugin.build_start(&EntryInputs::Single(entry.to_string_lossy().into_owned()))?;
  // entry points go through the hook too, even though nothing claims them
  plugin.resolve_id(&entry.to_string_lossy(), None).await?;

  let source = tokio::fs::read_to_string(entry).await?;

  let mut rewrites = BTreeMap::new();
  for specifier in import_specifiers(&source) {
    let wrapper_id = match plugin.resolve_id(&specifier, Some(entry)).await? {
      ResolveOutcome::Rewritten(wrapper_id) => wrapper_id,
      outcome => {
        debug!("keeping `{specifier}` ({outcome:?})");
        continue;
      }
    };

    let asset_id = follow_wrapper(plugin, &specifier, entry, &wrapper_id).await?;
    let emitted_as = emitted_specifier(&asset_id);
    debug!("`{specifier}` => {wrapper_id} => {emitted_as}");
    rewrites.insert(specifier.clone(), Rewrite {
      specifier,
      asset_id,
      emitted_as,
    });
  }

  let rewritten = import_pattern().replace_all(&source, |caps: &Captures| match rewrites.get(&caps[3]) {
    Some(rewrite) => format!("{}{}{}{}", &caps[1], &caps[2], rewrite.emitted_as, &caps[4]),
    None => caps[0].to_string(),
  });

  if let Some(parent) = output_file.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(output_file, rewritten.as_bytes()).await?;

  plugin.write_bundle(output_file).await?;

  Ok(BundleReport {
    output_file: output_file.to_path_buf(),
    rewrites: rewrites.into_values().collect(),
  })
}

/// Load a wrapper module and make sure its re-export stays external.
async fn follow_wrapper<P: BundlerPlugin>(
  plugin: &P,
  specifier: &str,
  entry: &Path,
  wrapper_id: &str,
) -> RebaseResult<String> {
  let resolve_error = |message: String| RebaseError::Resolve {
    importee: specifier.to_string(),
    importer: entry.to_path_buf(),
    source: anyhow!(message),
  };

  let wrapper_source = plugin
    .load(wrapper_id)
    .ok_or_else(|| resolve_error(format!("no module was loaded for {wrapper_id}")))?;
  let asset_id = reexported_id(&wrapper_source)
    .ok_or_else(|| resolve_error(format!("{wrapper_id} does not re-export an asset")))?;

  match plugin.resolve_id(&asset_id, Some(Path::new(wrapper_id))).await? {
    ResolveOutcome::Excluded => Ok(asset_id),
    outcome => Err(resolve_error(format!(
      "asset id {asset_id} was not kept external ({outcome:?})"
    ))),
  }
}

/// Specifier reaching an emitted asset from the output file's directory.
///
/// Assets land below the output directory at their target path, minus any root.
fn emitted_specifier(asset_id: &str) -> String {
  let destination = output_destination(Path::new(""), asset_id);
  enforce_dot_slash(&to_forward_slashes(&destination))
}
