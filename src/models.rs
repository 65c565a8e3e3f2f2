//! Data structures shared between the resolution and emission phases.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RebaseError, RebaseResult};

/// Deferred copy or transform job registered while resolving imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJob {
  /// Absolute (or importer-relative, normalised) path of the asset on disk.
  pub source_path: PathBuf,
  /// Output-relative target chosen when the asset was first resolved.
  pub target_path: String,
}

/// Content-derived identity of a single asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIdentity {
  /// Short digest of the asset bytes.
  pub hash: String,
  /// File name inside the output folder.
  pub file_name: String,
  /// Forward-slash target path relative to the output root.
  pub target_path: String,
}

/// Answer returned to the host for a single `resolve_id` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
  /// Not an asset handled here; the host should continue with other resolvers.
  Unhandled,
  /// Already rewritten asset reference; keep it out of the module graph.
  Excluded,
  /// Rewritten identifier of the synthetic wrapper module.
  Rewritten(String),
}

impl ResolveOutcome {
  /// Rewritten identifier, if any.
  pub fn rewritten(&self) -> Option<&str> {
    match self {
      Self::Rewritten(id) => Some(id),
      _ => None,
    }
  }
}

/// Entry points configured for a bundle build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntryInputs {
  /// Single entry module.
  Single(String),
  /// Ordered list of entry modules.
  List(Vec<String>),
  /// Named entry modules, in configuration order.
  Named(IndexMap<String, String>),
}

impl EntryInputs {
  /// Interpret an arbitrary JSON value as an entry configuration.
  pub fn from_value(value: Value) -> RebaseResult<Self> {
    match value {
      Value::String(input) => Ok(Self::Single(input)),
      Value::Array(items) => items
        .into_iter()
        .map(|item| match item {
          Value::String(input) => Ok(input),
          _ => Err(invalid_shape()),
        })
        .collect::<RebaseResult<Vec<_>>>()
        .map(Self::List),
      Value::Object(map) => map
        .into_iter()
        .map(|(name, item)| match item {
          Value::String(input) => Ok((name, input)),
          _ => Err(invalid_shape()),
        })
        .collect::<RebaseResult<IndexMap<_, _>>>()
        .map(Self::Named),
      _ => Err(invalid_shape()),
    }
  }

  /// Entry paths in configuration order.
  pub fn paths(&self) -> Vec<&str> {
    match self {
      Self::Single(input) => vec![input.as_str()],
      Self::List(inputs) => inputs.iter().map(String::as_str).collect(),
      Self::Named(inputs) => inputs.values().map(String::as_str).collect(),
    }
  }

  /// Shallowest directory containing an entry point.
  ///
  /// Candidates are compared by their textual length; a later entry only replaces the
  /// current base when it is strictly shorter.
  pub fn base_dir(&self) -> RebaseResult<PathBuf> {
    let mut base: Option<PathBuf> = None;
    for input in self.paths() {
      let candidate = entry_dir(Path::new(input));
      let shorter = base
        .as_ref()
        .is_none_or(|current| candidate.as_os_str().len() < current.as_os_str().len());
      if shorter {
        base = Some(candidate);
      }
    }

    base.ok_or_else(|| {
      RebaseError::Config("The bundle input passed into asset_rebase contained no entry points.".into())
    })
  }
}

impl From<&str> for EntryInputs {
  fn from(input: &str) -> Self {
    Self::Single(input.to_string())
  }
}

fn entry_dir(input: &Path) -> PathBuf {
  match input.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  }
}

fn invalid_shape() -> RebaseError {
  RebaseError::Config(
    "The bundle input passed into asset_rebase was neither a string, array or object.".into(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn accepts_all_three_entry_shapes() {
    assert_eq!(
      EntryInputs::from_value(json!("src/index.js")).unwrap(),
      EntryInputs::Single("src/index.js".into())
    );
    assert_eq!(
      EntryInputs::from_value(json!(["a/index.js", "b.js"])).unwrap().paths(),
      vec!["a/index.js", "b.js"]
    );
    let named = EntryInputs::from_value(json!({"main": "src/main.js"})).unwrap();
    assert_eq!(named.paths(), vec!["src/main.js"]);
  }

  #[test]
  fn rejects_unknown_entry_shapes() {
    for value in [json!(42), json!(null), json!(true), json!([1]), json!({"a": []})] {
      let error = EntryInputs::from_value(value).unwrap_err();
      assert!(matches!(error, RebaseError::Config(_)));
      assert!(error.to_string().contains("neither a string, array or object"));
    }
  }

  #[test]
  fn base_dir_prefers_shortest_entry_directory() {
    let inputs = EntryInputs::List(vec![
      "src/pages/deep/index.js".into(),
      "src/main.js".into(),
      "lib/x.js".into(),
    ]);
    assert_eq!(inputs.base_dir().unwrap(), PathBuf::from("src"));
  }

  #[test]
  fn base_dir_keeps_first_on_equal_length() {
    let inputs = EntryInputs::List(vec!["aaa/index.js".into(), "bbb/index.js".into()]);
    assert_eq!(inputs.base_dir().unwrap(), PathBuf::from("aaa"));
  }

  #[test]
  fn named_entries_keep_configuration_order() {
    let inputs = EntryInputs::from_value(json!({
      "zmain": "aaa/index.js",
      "alt": "bbb/index.js",
    }))
    .unwrap();
    assert_eq!(inputs.paths(), vec!["aaa/index.js", "bbb/index.js"]);
    assert_eq!(inputs.base_dir().unwrap(), PathBuf::from("aaa"));

    let parsed: EntryInputs = serde_json::from_str(r#"{"zmain": "ccc/a.js", "alt": "ddd/a.js"}"#).unwrap();
    assert_eq!(parsed.base_dir().unwrap(), PathBuf::from("ccc"));
  }

  #[test]
  fn bare_entry_file_uses_current_directory() {
    let inputs = EntryInputs::from("index.js");
    assert_eq!(inputs.base_dir().unwrap(), PathBuf::from("."));
  }

  #[test]
  fn empty_entry_list_is_a_configuration_error() {
    let inputs = EntryInputs::List(Vec::new());
    assert!(matches!(inputs.base_dir(), Err(RebaseError::Config(_))));
  }
}
