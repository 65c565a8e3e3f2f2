//! Build-scoped job queue and the lookup indices backing the two-phase resolver.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::models::AssetJob;

#[derive(Debug, Default)]
struct TableState {
  jobs: BTreeMap<PathBuf, String>,
  wrappers: HashMap<String, String>,
  known_assets: HashSet<String>,
}

/// Outcome of [`RebaseTable::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
  /// Authoritative target path for the source.
  pub target_path: String,
  /// `true` when this call created the job.
  pub inserted: bool,
}

/// Rebase jobs keyed by source path plus the wrapper and known-asset indices.
///
/// The lock is only taken for individual map operations, never across an await point.
#[derive(Debug, Default)]
pub struct RebaseTable {
  state: Mutex<TableState>,
}

impl RebaseTable {
  /// Create an empty table.
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a job for `source`, keeping an existing target untouched.
  pub fn register(&self, source: &Path, target_path: &str) -> Registration {
    let mut state = self.state.lock();
    if let Some(existing) = state.jobs.get(source) {
      return Registration {
        target_path: existing.clone(),
        inserted: false,
      };
    }

    state
      .jobs
      .insert(source.to_path_buf(), target_path.to_string());
    Registration {
      target_path: target_path.to_string(),
      inserted: true,
    }
  }

  /// Target path registered for `source`.
  pub fn target_for(&self, source: &Path) -> Option<String> {
    self.state.lock().jobs.get(source).cloned()
  }

  /// Record a rewritten asset id together with the wrapper module pointing at it.
  pub fn record_wrapper(&self, wrapper_id: &str, asset_id: &str) {
    let mut state = self.state.lock();
    state.known_assets.insert(asset_id.to_string());
    state
      .wrappers
      .insert(wrapper_id.to_string(), asset_id.to_string());
  }

  /// Whether `id` was already handed out as a rewritten asset id.
  pub fn is_known_asset(&self, id: &str) -> bool {
    self.state.lock().known_assets.contains(id)
  }

  /// Asset id re-exported by the wrapper module `wrapper_id`.
  pub fn wrapped_asset(&self, wrapper_id: &str) -> Option<String> {
    self.state.lock().wrappers.get(wrapper_id).cloned()
  }

  /// Snapshot of every registered job ordered by source path.
  pub fn jobs(&self) -> Vec<AssetJob> {
    self
      .state
      .lock()
      .jobs
      .iter()
      .map(|(source_path, target_path)| AssetJob {
        source_path: source_path.clone(),
        target_path: target_path.clone(),
      })
      .collect()
  }

  /// Number of registered jobs.
  pub fn len(&self) -> usize {
    self.state.lock().jobs.len()
  }

  /// Whether no job was registered yet.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
