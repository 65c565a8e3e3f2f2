use std::path::{Component, Path, PathBuf};

use sugar_path::SugarPath;

/// Produce the canonical target path of a rebased asset.
///
/// The path is `base_dir/folder/file_name`, lexically normalised and always written with
/// forward slashes so that it doubles as an import specifier. Relative results are prefixed
/// with `./` unless they already start with a dot.
pub fn make_target_path(base_dir: &Path, folder: &str, file_name: &str) -> String {
  let joined = base_dir.join(folder).join(file_name).normalize();
  enforce_dot_slash(&to_forward_slashes(&joined))
}

/// Convert a path into its forward-slash textual form.
pub fn to_forward_slashes(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

/// Prefix relative specifiers with `./`.
pub fn enforce_dot_slash(path: &str) -> String {
  if path.starts_with('.') || path.starts_with('/') || has_drive_prefix(path) {
    path.to_string()
  } else {
    format!("./{path}")
  }
}

fn has_drive_prefix(path: &str) -> bool {
  let bytes = path.as_bytes();
  bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Location of a target path below the emission root.
///
/// Root, prefix and `.` components of the target are dropped so the result never escapes
/// `output_dir` through an absolute join.
pub fn output_destination(output_dir: &Path, target_path: &str) -> PathBuf {
  let relative: PathBuf = Path::new(target_path)
    .components()
    .filter(|component| matches!(component, Component::Normal(_) | Component::ParentDir))
    .collect();
  output_dir.join(relative).normalize()
}

/// Resolve an import specifier against the directory of its importer.
///
/// The result is absolute so that differently spelled references to one file share a key.
pub fn resolve_from_importer(importer: &Path, specifier: &str) -> PathBuf {
  let importer_dir = importer.parent().unwrap_or_else(|| Path::new("."));
  importer_dir.join(specifier).absolutize()
}
