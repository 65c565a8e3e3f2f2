//! Stylesheet pipeline: dialect detection, `@import` inlining and `url()` rebasing.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use rsass::{compile_scss_path, output};
use serde::{Deserialize, Serialize};
use sugar_path::SugarPath;

use crate::asset_paths::{
  output_destination, resolve_from_importer, should_ignore_asset_reference, to_forward_slashes,
};
use crate::table::RebaseTable;

/// Stylesheet dialects recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleDialect {
  /// Plain CSS.
  Css,
  /// PostCSS flavoured CSS.
  Pcss,
  /// Sass, SCSS syntax.
  Scss,
  /// Sass, indented syntax.
  Sass,
  /// SugarSS.
  Sss,
}

/// Parser applied before a stylesheet is rebased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleParser {
  /// Compile SCSS into plain CSS.
  ///
  /// Partials are inlined by the compiler verbatim, so their `url()` references are read
  /// relative to the compiled entry file. Assets referenced from partials in other
  /// directories are not found there; they are logged and left as written.
  Scss,
}

impl StyleDialect {
  /// Every dialect handled by the pipeline.
  pub const ALL: [StyleDialect; 5] = [Self::Css, Self::Pcss, Self::Scss, Self::Sass, Self::Sss];

  /// Dialect for an extension, with or without the leading dot.
  pub fn from_extension(extension: &str) -> Option<Self> {
    let extension = extension.trim_start_matches('.');
    Self::ALL
      .into_iter()
      .find(|dialect| dialect.extension().eq_ignore_ascii_case(extension))
  }

  /// Dialect of the file at `path`.
  pub fn from_path(path: &Path) -> Option<Self> {
    path
      .extension()
      .and_then(|extension| extension.to_str())
      .and_then(Self::from_extension)
  }

  /// Extension without the leading dot.
  pub fn extension(self) -> &'static str {
    match self {
      Self::Css => "css",
      Self::Pcss => "pcss",
      Self::Scss => "scss",
      Self::Sass => "sass",
      Self::Sss => "sss",
    }
  }

  /// Extension of the emitted file, including the dot.
  ///
  /// Dialects that reach plain CSS (directly, through PostCSS-compatible syntax or by
  /// compilation) ship as `.css`. Indented Sass and SugarSS have no parser and keep their
  /// own extension so the output is never mislabelled.
  pub fn output_extension(self) -> &'static str {
    match self {
      Self::Css | Self::Pcss | Self::Scss => ".css",
      Self::Sass => ".sass",
      Self::Sss => ".sss",
    }
  }

  /// Parser converting this dialect into CSS, when one is available.
  pub fn parser(self) -> Option<StyleParser> {
    match self {
      Self::Scss => Some(StyleParser::Scss),
      Self::Css | Self::Pcss | Self::Sass | Self::Sss => None,
    }
  }
}

impl StyleParser {
  fn parse(self, path: &Path) -> Result<String> {
    match self {
      Self::Scss => {
        let format = output::Format {
          style: output::Style::Expanded,
          ..Default::default()
        };
        let css = compile_scss_path(path, format)
          .map_err(|err| anyhow!("failed to compile {}: {err}", path.display()))?;
        String::from_utf8(css).with_context(|| format!("{} compiled to invalid UTF-8", path.display()))
      }
    }
  }
}

fn url_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#).expect("invalid url regex")
  })
}

fn import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?(?:"([^"]+)"|'([^']+)')\s*\)?\s*;"#)
      .expect("invalid import regex")
  })
}

/// Split `font.woff?#iefix` into the path and its query/fragment suffix.
pub fn split_reference_suffix(reference: &str) -> (&str, &str) {
  match reference.find(['?', '#']) {
    Some(index) => reference.split_at(index),
    None => (reference, ""),
  }
}

/// Rewrite every rebasable `url()` reference through `rebase`.
///
/// `rebase` receives the reference without its query or fragment; returning `None` keeps the
/// reference untouched. Quoting and suffixes are preserved.
pub fn rewrite_references<F>(css: &str, mut rebase: F) -> String
where
  F: FnMut(&str) -> Option<String>,
{
  url_pattern()
    .replace_all(css, |caps: &Captures| {
      let original = caps[0].to_string();
      let (quote, reference) = url_reference(caps);
      let (path, suffix) = split_reference_suffix(reference);
      if should_ignore_asset_reference(path) {
        return original;
      }

      match rebase(path) {
        Some(rebased) => format!("url({quote}{rebased}{suffix}{quote})"),
        None => original,
      }
    })
    .into_owned()
}

/// Local asset references of a stylesheet in order of appearance, without duplicates.
pub fn stylesheet_references(css: &str) -> Vec<String> {
  let mut seen = BTreeSet::new();
  let mut references = Vec::new();
  for caps in url_pattern().captures_iter(css) {
    let (_, reference) = url_reference(&caps);
    let (path, _) = split_reference_suffix(reference);
    if should_ignore_asset_reference(path) {
      continue;
    }
    if seen.insert(path.to_string()) {
      references.push(path.to_string());
    }
  }
  references
}

fn url_reference<'c>(caps: &'c Captures) -> (&'static str, &'c str) {
  if let Some(value) = caps.get(1) {
    ("\"", value.as_str())
  } else if let Some(value) = caps.get(2) {
    ("'", value.as_str())
  } else {
    ("", caps.get(3).map_or("", |value| value.as_str()))
  }
}

/// Stylesheet after dialect parsing and `@import` inlining.
#[derive(Debug, Clone)]
pub struct PreparedStylesheet {
  /// Source text as authored.
  pub original: String,
  /// CSS with imports inlined; `url()` references are relative to the stylesheet itself.
  pub css: String,
  /// Whether parsing or inlining changed the line structure of the source.
  pub restructured: bool,
}

/// Parse a stylesheet and inline its local `@import` rules.
pub fn prepare_stylesheet(path: &Path) -> Result<PreparedStylesheet> {
  let original = fs::read_to_string(path)
    .with_context(|| format!("failed to read stylesheet at {}", path.display()))?;

  let mut visited = BTreeSet::new();
  visited.insert(path.absolutize());

  let css = match StyleDialect::from_path(path).and_then(StyleDialect::parser) {
    Some(parser) => parser.parse(path)?,
    None => inline_imports(path, &original, &mut visited)?,
  };
  let restructured = css != original;

  Ok(PreparedStylesheet {
    original,
    css,
    restructured,
  })
}

fn directory_of(path: &Path) -> PathBuf {
  path.parent().unwrap_or_else(|| Path::new(".")).absolutize()
}

fn inline_imports(path: &Path, css: &str, visited: &mut BTreeSet<PathBuf>) -> Result<String> {
  let mut failure = None;
  let inlined = import_pattern()
    .replace_all(css, |caps: &Captures| {
      let original = caps[0].to_string();
      let reference = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map_or("", |value| value.as_str());
      if should_ignore_asset_reference(reference) || failure.is_some() {
        return original;
      }

      let imported = resolve_from_importer(path, reference);
      // already inlined once, or an import cycle
      if !visited.insert(imported.clone()) {
        return String::new();
      }

      match load_import(&imported, &directory_of(path), visited) {
        Ok(content) => content,
        Err(err) => {
          failure = Some(err);
          original
        }
      }
    })
    .into_owned();

  match failure {
    Some(err) => Err(err.context(format!("failed to inline imports of {}", path.display()))),
    None => Ok(inlined),
  }
}

fn load_import(imported: &Path, importer_dir: &Path, visited: &mut BTreeSet<PathBuf>) -> Result<String> {
  let source = fs::read_to_string(imported)
    .with_context(|| format!("failed to read imported stylesheet {}", imported.display()))?;
  let css = match StyleDialect::from_path(imported).and_then(StyleDialect::parser) {
    Some(parser) => parser.parse(imported)?,
    None => inline_imports(imported, &source, visited)?,
  };

  let imported_dir = directory_of(imported);
  Ok(rewrite_references(&css, |reference| {
    // root-relative urls address the deployed site, not the imported file
    if reference.starts_with('/') || Path::new(reference).is_absolute() {
      return None;
    }
    let target = imported_dir.join(reference).normalize();
    Some(to_forward_slashes(&target.relative(importer_dir)))
  }))
}

/// Minimal revision 3 source map emitted next to processed stylesheets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
  /// Always `3`.
  pub version: u8,
  /// File name of the generated stylesheet.
  pub file: String,
  /// Sources relative to the generated stylesheet.
  pub sources: Vec<String>,
  /// Embedded source text, parallel to `sources`.
  pub sources_content: Vec<String>,
  /// Symbol names; unused for stylesheets.
  pub names: Vec<String>,
  /// Base64 VLQ mappings.
  pub mappings: String,
}

impl SourceMap {
  /// Map a generated file back to one source file.
  ///
  /// When `line_count` is given every generated line maps to the same source line.
  pub fn for_single_source(
    file: String,
    source: String,
    content: String,
    line_count: Option<usize>,
  ) -> Self {
    let mappings = match line_count {
      Some(0) | None => String::new(),
      Some(lines) => {
        let mut mappings = String::from("AAAA");
        for _ in 1..lines {
          mappings.push_str(";AACA");
        }
        mappings
      }
    };

    Self {
      version: 3,
      file,
      sources: vec![source],
      sources_content: vec![content],
      names: Vec::new(),
      mappings,
    }
  }
}

/// Everything a [`StyleProcessor`] needs to transform one stylesheet job.
#[derive(Debug, Clone, Copy)]
pub struct StyleRequest<'a> {
  /// Stylesheet on disk.
  pub source: &'a Path,
  /// Output location of the processed stylesheet.
  pub destination: &'a Path,
  /// Emission root all registered targets are relative to.
  pub output_dir: &'a Path,
  /// Whether rebased file names keep their original stem.
  pub keep_name: bool,
  /// Registered jobs, used to look up nested asset targets.
  pub table: &'a RebaseTable,
}

/// Processed stylesheet plus its source map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOutput {
  /// Generated CSS including the source map annotation.
  pub css: String,
  /// Source map to be written at `<destination>.map`.
  pub map: SourceMap,
}

/// Transform applied to stylesheet assets during materialization.
pub trait StyleProcessor: Send + Sync {
  /// Produce the rebased stylesheet for `request`.
  fn process(&self, request: &StyleRequest<'_>) -> Result<StyleOutput>;
}

/// Default processor: rewrites `url()` references to the rebased names of nested assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssRebaser;

impl StyleProcessor for CssRebaser {
  fn process(&self, request: &StyleRequest<'_>) -> Result<StyleOutput> {
    let prepared = prepare_stylesheet(request.source)?;
    let destination_dir = directory_of(request.destination);

    let rebased = rewrite_references(&prepared.css, |reference| {
      let nested = resolve_from_importer(request.source, reference);
      let Some(target) = request.table.target_for(&nested) else {
        tracing::warn!(
          "leaving unresolved reference `{reference}` in {}",
          request.source.display()
        );
        return None;
      };
      let nested_destination = output_destination(request.output_dir, &target).absolutize();
      Some(to_forward_slashes(&nested_destination.relative(&destination_dir)))
    });

    let file_name = request
      .destination
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .ok_or_else(|| anyhow!("invalid stylesheet destination {}", request.destination.display()))?;
    let source_name = to_forward_slashes(&request.source.absolutize().relative(&destination_dir));
    let line_count = (!prepared.restructured).then(|| rebased.lines().count());

    let css = format!("{rebased}\n/*# sourceMappingURL={file_name}.map */");
    let map = SourceMap::for_single_source(file_name, source_name, prepared.original, line_count);

    Ok(StyleOutput { css, map })
  }
}
