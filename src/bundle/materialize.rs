//! Deferred emission of every registered asset job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use same_file::is_same_file;
use tracing::{debug, error, info};

use crate::asset_paths::output_destination;
use crate::bundle::styles::{StyleDialect, StyleProcessor, StyleRequest};
use crate::error::{RebaseError, RebaseResult};
use crate::models::AssetJob;
use crate::table::RebaseTable;

/// Settings shared by all jobs of one emission.
#[derive(Clone)]
pub struct MaterializeOptions<'a> {
  /// Directory of the bundle's output file.
  pub output_dir: &'a Path,
  /// Passed through to the style processor.
  pub keep_name: bool,
  /// Log every job at `info` instead of `debug`.
  pub verbose: bool,
  /// Maximum number of jobs in flight; `None` runs all at once.
  pub concurrency: Option<usize>,
  /// Transform used for stylesheet jobs.
  pub processor: Arc<dyn StyleProcessor>,
  /// Registered jobs, consulted for nested stylesheet references.
  pub table: Arc<RebaseTable>,
}

/// Copy or transform every job, returning the number of emitted assets.
///
/// All jobs run to completion even when some fail; failures are reported together.
pub async fn materialize(jobs: Vec<AssetJob>, options: MaterializeOptions<'_>) -> RebaseResult<usize> {
  let total = jobs.len();
  let limit = options.concurrency.unwrap_or(total).max(1);

  let results: Vec<(PathBuf, Result<()>)> = stream::iter(jobs)
    .map(|job| {
      let options = options.clone();
      async move {
        let result = materialize_job(&job, &options).await;
        (job.source_path, result)
      }
    })
    .buffer_unordered(limit)
    .collect()
    .await;

  let mut failed = Vec::new();
  let mut first_error = None;
  for (source, result) in results {
    if let Err(err) = result {
      error!("failed to emit {}: {err:#}", source.display());
      failed.push(source);
      first_error.get_or_insert(err);
    }
  }

  match first_error {
    Some(source) => {
      failed.sort();
      Err(RebaseError::Materialize { failed, source })
    }
    None => Ok(total),
  }
}

async fn materialize_job(job: &AssetJob, options: &MaterializeOptions<'_>) -> Result<()> {
  let destination = output_destination(options.output_dir, &job.target_path);
  if let Some(parent) = destination.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }

  if StyleDialect::from_path(&job.source_path).is_some() {
    progress(options.verbose, "Processing", &job.source_path, &destination);
    process_stylesheet(job, &destination, options).await
  } else {
    progress(options.verbose, "Copying", &job.source_path, &destination);
    install_asset(&job.source_path, &destination).await
  }
}

fn progress(verbose: bool, action: &str, source: &Path, destination: &Path) {
  if verbose {
    info!("{action} {} => {}...", source.display(), destination.display());
  } else {
    debug!("{action} {} => {}...", source.display(), destination.display());
  }
}

async fn process_stylesheet(
  job: &AssetJob,
  destination: &Path,
  options: &MaterializeOptions<'_>,
) -> Result<()> {
  let processor = Arc::clone(&options.processor);
  let table = Arc::clone(&options.table);
  let source = job.source_path.clone();
  let target = destination.to_path_buf();
  let output_dir = options.output_dir.to_path_buf();
  let keep_name = options.keep_name;

  // parsing and import inlining read from disk synchronously
  let output = tokio::task::spawn_blocking(move || {
    processor.process(&StyleRequest {
      source: &source,
      destination: &target,
      output_dir: &output_dir,
      keep_name,
      table: &table,
    })
  })
  .await
  .context("stylesheet worker stopped")??;

  tokio::fs::write(destination, output.css)
    .await
    .with_context(|| format!("failed to write {}", destination.display()))?;

  let map_path = source_map_path(destination);
  let map = serde_json::to_string(&output.map)?;
  tokio::fs::write(&map_path, map)
    .await
    .with_context(|| format!("failed to write {}", map_path.display()))
}

/// Location of the source map written next to a processed stylesheet.
pub fn source_map_path(destination: &Path) -> PathBuf {
  let mut path = destination.as_os_str().to_owned();
  path.push(".map");
  PathBuf::from(path)
}

async fn install_asset(source: &Path, destination: &Path) -> Result<()> {
  if tokio::fs::try_exists(destination).await.unwrap_or(false)
    && is_same_file(source, destination)
      .with_context(|| format!("failed to compare {} with {}", source.display(), destination.display()))?
  {
    return Ok(());
  }

  tokio::fs::copy(source, destination)
    .await
    .with_context(|| format!("failed to copy {} to {}", source.display(), destination.display()))?;
  Ok(())
}
