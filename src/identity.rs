//! Content-addressed naming of assets.

use std::path::Path;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};

use crate::asset_paths::{make_target_path, specifier_extension};
use crate::bundle::styles::StyleDialect;
use crate::models::AssetIdentity;

/// Digest function turning asset bytes into a short, stable identifier.
pub trait ContentHasher: Send + Sync {
  /// Hash the provided content.
  fn hash(&self, content: &[u8]) -> String;
}

impl<F> ContentHasher for F
where
  F: Fn(&[u8]) -> String + Send + Sync,
{
  fn hash(&self, content: &[u8]) -> String {
    self(content)
  }
}

/// Default hasher: the first 48 bits of a SHA-256 digest, URL-safe base64 encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

/// Number of digest bytes kept; six bytes encode to eight characters.
const HASH_BYTES: usize = 6;

impl ContentHasher for Sha256Hasher {
  fn hash(&self, content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    general_purpose::URL_SAFE_NO_PAD.encode(&digest[..HASH_BYTES])
  }
}

/// Naming options applied to every rebased asset.
#[derive(Debug, Clone, Copy)]
pub struct NamingOptions<'a> {
  /// Shallowest entry directory of the build.
  pub base_dir: &'a Path,
  /// Sub folder below `base_dir`.
  pub folder: &'a str,
  /// Prefix the hash with the original base name.
  pub keep_name: bool,
}

/// Build the target file name for an asset.
///
/// `stem` and `extension` come from the import specifier. Stylesheet dialects take the
/// extension they are emitted with, `.css` for everything that reaches plain CSS.
pub fn target_file_name(hash: &str, stem: &str, extension: &str, keep_name: bool) -> String {
  let extension = match StyleDialect::from_extension(extension) {
    Some(dialect) => dialect.output_extension(),
    None => extension,
  };

  if keep_name {
    format!("{stem}_{hash}{extension}")
  } else {
    format!("{hash}{extension}")
  }
}

/// Hash an asset and derive its target location.
pub async fn resolve_identity(
  hasher: &dyn ContentHasher,
  source: &Path,
  specifier: &str,
  naming: NamingOptions<'_>,
) -> Result<AssetIdentity> {
  let content = tokio::fs::read(source)
    .await
    .with_context(|| format!("failed to read {}", source.display()))?;

  Ok(identity_for_content(hasher, &content, specifier, naming))
}

/// Derive an identity from already loaded content.
pub fn identity_for_content(
  hasher: &dyn ContentHasher,
  content: &[u8],
  specifier: &str,
  naming: NamingOptions<'_>,
) -> AssetIdentity {
  let hash = hasher.hash(content);
  let extension = specifier_extension(specifier).unwrap_or_default();
  let name = specifier.rsplit(['/', '\\']).next().unwrap_or(specifier);
  let stem = &name[..name.len() - extension.len()];

  let file_name = target_file_name(&hash, stem, extension, naming.keep_name);
  let target_path = make_target_path(naming.base_dir, naming.folder, &file_name);

  AssetIdentity {
    hash,
    file_name,
    target_path,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn naming(keep_name: bool) -> NamingOptions<'static> {
    NamingOptions {
      base_dir: Path::new("__tests__/fixtures"),
      folder: "",
      keep_name,
    }
  }

  fn fixed(_: &[u8]) -> String {
    "bAFTozQS".to_string()
  }

  #[test]
  fn sha256_hash_is_short_and_stable() {
    let first = Sha256Hasher.hash(b"hello");
    assert_eq!(first.len(), 8);
    assert_eq!(first, Sha256Hasher.hash(b"hello"));
    assert_ne!(first, Sha256Hasher.hash(b"hello!"));
    assert!(first.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
  }

  #[test]
  fn hash_only_name_by_default() {
    let identity = identity_for_content(&fixed, b"", "./image.png", naming(false));
    assert_eq!(identity.file_name, "bAFTozQS.png");
    assert_eq!(identity.target_path, "./__tests__/fixtures/bAFTozQS.png");
  }

  #[test]
  fn keep_name_prefixes_original_stem() {
    let identity = identity_for_content(&fixed, b"", "./image.png", naming(true));
    assert_eq!(identity.file_name, "image_bAFTozQS.png");

    let font = identity_for_content(&fixed, b"", "./SourceSerifPro-Bold.ttf.woff", naming(true));
    assert_eq!(font.file_name, "SourceSerifPro-Bold.ttf_bAFTozQS.woff");
  }

  #[test]
  fn stylesheet_dialects_emit_css() {
    assert_eq!(target_file_name("h", "main", ".scss", false), "h.css");
    assert_eq!(target_file_name("h", "main", ".pcss", true), "main_h.css");
    assert_eq!(target_file_name("h", "main", ".css", false), "h.css");
  }

  #[test]
  fn indented_dialects_keep_their_extension() {
    assert_eq!(target_file_name("h", "main", ".sass", false), "h.sass");
    assert_eq!(target_file_name("h", "main", ".sss", true), "main_h.sss");
  }

  #[test]
  fn folder_is_inserted_below_base_dir() {
    let options = NamingOptions {
      folder: "static",
      ..naming(false)
    };
    let identity = identity_for_content(&fixed, b"", "../deep/blank.gif", options);
    assert_eq!(identity.target_path, "./__tests__/fixtures/static/bAFTozQS.gif");
  }

  #[tokio::test]
  async fn identical_content_shares_identity_regardless_of_location() {
    let temp = tempdir().unwrap();
    let first = temp.path().join("a/logo.png");
    let second = temp.path().join("b/c/logo.png");
    std::fs::create_dir_all(first.parent().unwrap()).unwrap();
    std::fs::create_dir_all(second.parent().unwrap()).unwrap();
    std::fs::write(&first, b"pixels").unwrap();
    std::fs::write(&second, b"pixels").unwrap();

    let a = resolve_identity(&Sha256Hasher, &first, "./logo.png", naming(false)).await.unwrap();
    let b = resolve_identity(&Sha256Hasher, &second, "../c/logo.png", naming(false))
      .await
      .unwrap();
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn missing_files_fail_with_context() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("nope.png");
    let error = resolve_identity(&Sha256Hasher, &missing, "./nope.png", naming(false))
      .await
      .unwrap_err();
    assert!(error.to_string().starts_with("failed to read"));
  }
}
