//! Bundler-facing hooks implementing the two-phase resolve/load protocol.
//!
//! A host bundler expects every import edge to resolve to a loadable module, while the
//! rebased asset itself has to stay an external reference so it survives verbatim in the
//! emitted code. Resolution therefore hands out two identities per asset: the wrapper id
//! (`<asset id>.js`) which the host loads as a module, and the asset id which that wrapper
//! re-exports. When the host follows the re-export, the asset id is recognised and excluded
//! from the graph, leaving it external.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::asset_paths::{AssetFilter, resolve_from_importer, specifier_extension};
use crate::bundle::materialize::{MaterializeOptions, materialize};
use crate::bundle::styles::{CssRebaser, StyleDialect, StyleProcessor, prepare_stylesheet, stylesheet_references};
use crate::config::RebaseConfig;
use crate::error::{RebaseError, RebaseResult};
use crate::identity::{ContentHasher, NamingOptions, Sha256Hasher, resolve_identity};
use crate::models::{EntryInputs, ResolveOutcome};
use crate::table::RebaseTable;

/// Hook set a host bundler drives during one build.
pub trait BundlerPlugin {
  /// Plugin name reported to the host.
  fn name(&self) -> &'static str;

  /// Receive the configured entry points before any resolution happens.
  fn build_start(&self, input: &EntryInputs) -> RebaseResult<()>;

  /// Resolve `importee` as imported from `importer` (`None` for entry points).
  fn resolve_id(
    &self,
    importee: &str,
    importer: Option<&Path>,
  ) -> impl Future<Output = RebaseResult<ResolveOutcome>>;

  /// Source of a module created during resolution, if this plugin owns it.
  fn load(&self, id: &str) -> Option<String>;

  /// Emit deferred assets next to the bundle written at `output_file`.
  fn write_bundle(&self, output_file: &Path) -> impl Future<Output = RebaseResult<()>>;
}

/// Asset rebasing plugin; create one instance per build.
pub struct RebasePlugin {
  config: RebaseConfig,
  filter: AssetFilter,
  hasher: Box<dyn ContentHasher>,
  styles: Arc<dyn StyleProcessor>,
  base_dir: OnceLock<PathBuf>,
  table: Arc<RebaseTable>,
}

impl RebasePlugin {
  /// Create a plugin with the default hasher and stylesheet processor.
  pub fn new(config: RebaseConfig) -> RebaseResult<Self> {
    Ok(Self {
      filter: AssetFilter::from_config(&config)?,
      config,
      hasher: Box::new(Sha256Hasher),
      styles: Arc::new(CssRebaser),
      base_dir: OnceLock::new(),
      table: Arc::new(RebaseTable::new()),
    })
  }

  /// Replace the content hasher.
  pub fn with_hasher(mut self, hasher: impl ContentHasher + 'static) -> Self {
    self.hasher = Box::new(hasher);
    self
  }

  /// Replace the stylesheet processor.
  pub fn with_style_processor(mut self, processor: impl StyleProcessor + 'static) -> Self {
    self.styles = Arc::new(processor);
    self
  }

  /// Configuration the plugin was created with.
  pub fn config(&self) -> &RebaseConfig {
    &self.config
  }

  /// Base directory computed at build start.
  pub fn base_dir(&self) -> Option<&Path> {
    self.base_dir.get().map(PathBuf::as_path)
  }

  /// Jobs and indices collected so far.
  pub fn table(&self) -> &RebaseTable {
    &self.table
  }

  fn naming(&self) -> Result<NamingOptions<'_>> {
    let base_dir = self
      .base_dir()
      .ok_or_else(|| anyhow!("build_start must run before imports are resolved"))?;
    Ok(NamingOptions {
      base_dir,
      folder: &self.config.folder,
      keep_name: self.config.keep_name,
    })
  }

  async fn rebase_import(&self, importee: &str, importer: &Path) -> Result<ResolveOutcome> {
    let naming = self.naming()?;
    let source = resolve_from_importer(importer, importee);
    let identity = resolve_identity(self.hasher.as_ref(), &source, importee, naming).await?;
    let registration = self.table.register(&source, &identity.target_path);

    if registration.inserted && StyleDialect::from_path(&source).is_some() {
      self.register_nested_assets(&source, naming).await?;
    }

    let asset_id = registration.target_path.replace('\\', "/");
    let wrapper_id = format!("{asset_id}.js");
    self.table.record_wrapper(&wrapper_id, &asset_id);
    debug!("rebased `{importee}` from {} to {asset_id}", importer.display());

    Ok(ResolveOutcome::Rewritten(wrapper_id))
  }

  /// Register the assets referenced from a stylesheet, following nested stylesheets.
  async fn register_nested_assets(&self, stylesheet: &Path, naming: NamingOptions<'_>) -> Result<()> {
    let mut pending = vec![stylesheet.to_path_buf()];
    while let Some(sheet) = pending.pop() {
      let path = sheet.clone();
      let prepared = tokio::task::spawn_blocking(move || prepare_stylesheet(&path))
        .await
        .context("stylesheet worker stopped")??;
      for reference in stylesheet_references(&prepared.css) {
        let nested = resolve_from_importer(&sheet, &reference);
        let is_file = tokio::fs::metadata(&nested)
          .await
          .is_ok_and(|metadata| metadata.is_file());
        if specifier_extension(&reference).is_none() || !is_file {
          warn!("skipping unresolvable reference `{reference}` in {}", sheet.display());
          continue;
        }

        let identity = resolve_identity(self.hasher.as_ref(), &nested, &reference, naming).await?;
        let registration = self.table.register(&nested, &identity.target_path);
        debug!(
          "registered `{reference}` from {} as {}",
          sheet.display(),
          registration.target_path
        );
        if registration.inserted && StyleDialect::from_path(&nested).is_some() {
          pending.push(nested);
        }
      }
    }
    Ok(())
  }
}

impl BundlerPlugin for RebasePlugin {
  fn name(&self) -> &'static str {
    "asset-rebase"
  }

  fn build_start(&self, input: &EntryInputs) -> RebaseResult<()> {
    let base_dir = input.base_dir()?;
    if self.base_dir.set(base_dir).is_err() {
      debug!("base directory already computed for this build");
    }
    Ok(())
  }

  async fn resolve_id(&self, importee: &str, importer: Option<&Path>) -> RebaseResult<ResolveOutcome> {
    // Checked first: `.scss` and `.pcss` ids end in `.css`, which the filter may reject.
    if importer.is_some() && self.table.is_known_asset(importee) {
      return Ok(ResolveOutcome::Excluded);
    }

    if !self.filter.matches(importee) {
      return Ok(ResolveOutcome::Unhandled);
    }

    // Entry points are never assets.
    let Some(importer) = importer else {
      return Ok(ResolveOutcome::Unhandled);
    };

    if specifier_extension(importee).is_none() {
      return Ok(ResolveOutcome::Unhandled);
    }

    self
      .rebase_import(importee, importer)
      .await
      .map_err(|source| RebaseError::Resolve {
        importee: importee.to_string(),
        importer: importer.to_path_buf(),
        source,
      })
  }

  fn load(&self, id: &str) -> Option<String> {
    let asset_id = self.table.wrapped_asset(id)?;
    let literal = serde_json::to_string(&asset_id).ok()?;
    Some(format!("export {{ default }} from {literal};"))
  }

  async fn write_bundle(&self, output_file: &Path) -> RebaseResult<()> {
    let output_dir = output_file.parent().unwrap_or_else(|| Path::new("."));
    let jobs = self.table.jobs();
    info!("emitting {} rebased assets into {}", jobs.len(), output_dir.display());

    materialize(jobs, MaterializeOptions {
      output_dir,
      keep_name: self.config.keep_name,
      verbose: self.config.verbose,
      concurrency: self.config.concurrency,
      processor: Arc::clone(&self.styles),
      table: Arc::clone(&self.table),
    })
    .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::{TempDir, tempdir};

  fn fixture() -> (TempDir, PathBuf) {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("deep")).unwrap();
    fs::write(src.join("index.js"), "import logo from './logo.png';").unwrap();
    fs::write(src.join("logo.png"), b"png-bytes").unwrap();
    fs::write(src.join("deep/copy.png"), b"png-bytes").unwrap();
    fs::write(src.join("license"), b"MIT").unwrap();
    (temp, src)
  }

  fn plugin(src: &Path, config: RebaseConfig) -> RebasePlugin {
    let plugin = RebasePlugin::new(config)
      .unwrap()
      .with_hasher(|_: &[u8]| "bAFTozQS".to_string());
    plugin
      .build_start(&EntryInputs::Single(src.join("index.js").to_string_lossy().into_owned()))
      .unwrap();
    plugin
  }

  #[tokio::test]
  async fn rewrites_asset_imports_to_wrapper_ids() {
    let (_temp, src) = fixture();
    let plugin = plugin(&src, RebaseConfig::default());
    let importer = src.join("index.js");

    let outcome = plugin.resolve_id("./logo.png", Some(&importer)).await.unwrap();
    let expected_asset = format!("{}/bAFTozQS.png", src.to_string_lossy().replace('\\', "/"));
    assert_eq!(outcome, ResolveOutcome::Rewritten(format!("{expected_asset}.js")));
    assert_eq!(
      plugin.load(&format!("{expected_asset}.js")),
      Some(format!("export {{ default }} from \"{expected_asset}\";"))
    );
  }

  #[tokio::test]
  async fn known_asset_ids_are_excluded() {
    let (_temp, src) = fixture();
    let plugin = plugin(&src, RebaseConfig::default());
    let importer = src.join("index.js");

    let wrapper = plugin.resolve_id("./logo.png", Some(&importer)).await.unwrap();
    let wrapper = wrapper.rewritten().unwrap().to_string();
    let asset_id = wrapper.trim_end_matches(".js");

    let outcome = plugin.resolve_id(asset_id, Some(Path::new(&wrapper))).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::Excluded);
    assert_eq!(plugin.table().len(), 1);
  }

  #[tokio::test]
  async fn skips_entries_code_and_extensionless_imports() {
    let (_temp, src) = fixture();
    let plugin = plugin(&src, RebaseConfig {
      include: vec![".*".into()],
      exclude: vec![r"\.js$".into()],
      ..RebaseConfig::default()
    });
    let importer = src.join("index.js");

    assert_eq!(plugin.resolve_id("./logo.png", None).await.unwrap(), ResolveOutcome::Unhandled);
    assert_eq!(
      plugin.resolve_id("./util.js", Some(&importer)).await.unwrap(),
      ResolveOutcome::Unhandled
    );
    assert_eq!(
      plugin.resolve_id("./license", Some(&importer)).await.unwrap(),
      ResolveOutcome::Unhandled
    );
    assert!(plugin.table().is_empty());
  }

  #[tokio::test]
  async fn identical_content_from_different_importers_shares_target() {
    let (_temp, src) = fixture();
    let plugin = plugin(&src, RebaseConfig::default());

    let first = plugin.resolve_id("./logo.png", Some(&src.join("index.js"))).await.unwrap();
    let second = plugin
      .resolve_id("./copy.png", Some(&src.join("deep/index.js")))
      .await
      .unwrap();
    let again = plugin
      .resolve_id("../logo.png", Some(&src.join("deep/index.js")))
      .await
      .unwrap();

    assert_eq!(first, second);
    assert_eq!(first, again);
    // two distinct source files, one per path
    assert_eq!(plugin.table().len(), 2);
  }

  #[tokio::test]
  async fn missing_assets_are_resolution_errors() {
    let (_temp, src) = fixture();
    let plugin = plugin(&src, RebaseConfig::default());

    let error = plugin
      .resolve_id("./missing.png", Some(&src.join("index.js")))
      .await
      .unwrap_err();
    assert!(matches!(error, RebaseError::Resolve { ref importee, .. } if importee == "./missing.png"));
  }

  #[tokio::test]
  async fn resolving_before_build_start_fails() {
    let (_temp, src) = fixture();
    let plugin = RebasePlugin::new(RebaseConfig::default()).unwrap();

    let error = plugin
      .resolve_id("./logo.png", Some(&src.join("index.js")))
      .await
      .unwrap_err();
    assert!(format!("{:#}", anyhow::Error::from(error)).contains("build_start"));
  }

  #[test]
  fn base_dir_is_computed_once() {
    let plugin = RebasePlugin::new(RebaseConfig::default()).unwrap();
    plugin.build_start(&EntryInputs::from("src/deep/index.js")).unwrap();
    plugin.build_start(&EntryInputs::from("index.js")).unwrap();
    assert_eq!(plugin.base_dir(), Some(Path::new("src/deep")));
  }

  #[test]
  fn unknown_ids_are_not_loaded() {
    let plugin = RebasePlugin::new(RebaseConfig::default()).unwrap();
    assert_eq!(plugin.load("./index.js"), None);
  }

  #[tokio::test]
  async fn stylesheet_references_are_registered_during_resolution() {
    let (_temp, src) = fixture();
    fs::create_dir_all(src.join("fonts")).unwrap();
    fs::write(src.join("fonts/a.woff"), b"font").unwrap();
    fs::write(src.join("fonts/b.css"), ".b{src:url(a.woff)}").unwrap();
    fs::write(
      src.join("main.scss"),
      ".m { src: url(fonts/a.woff); }\n.n { src: url(fonts/b.css); }\n.o { src: url(none.png); }\n",
    )
    .unwrap();

    let plugin = RebasePlugin::new(RebaseConfig::default()).unwrap();
    plugin
      .build_start(&EntryInputs::Single(src.join("index.js").to_string_lossy().into_owned()))
      .unwrap();

    let outcome = plugin.resolve_id("./main.scss", Some(&src.join("index.js"))).await.unwrap();
    assert!(outcome.rewritten().unwrap().ends_with(".css.js"));

    let sources: Vec<_> = plugin.table().jobs().into_iter().map(|job| job.source_path).collect();
    assert_eq!(sources.len(), 3);
    assert!(sources.contains(&src.join("fonts/a.woff")));
    assert!(sources.contains(&src.join("fonts/b.css")));
  }
}
