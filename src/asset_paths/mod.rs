//! Helpers for deciding which imports are assets and where rebased assets land.
//!
//! The split mirrors the two questions asked for every import: should the reference be
//! rebased at all ([`filters`]), and which forward-slash, output-relative path does the
//! rebased file receive ([`bundle`]).

mod bundle;
mod filters;

pub use bundle::{
  enforce_dot_slash, make_target_path, output_destination, resolve_from_importer,
  to_forward_slashes,
};
pub use filters::{AssetFilter, should_ignore_asset_reference, specifier_extension};
