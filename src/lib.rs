#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod bundle;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod logging;
pub mod models;
pub mod plugin;
pub mod table;

pub use config::RebaseConfig;
pub use error::{RebaseError, RebaseResult};
pub use identity::{ContentHasher, Sha256Hasher};
pub use models::{AssetJob, EntryInputs, ResolveOutcome};
pub use plugin::{BundlerPlugin, RebasePlugin};
pub use table::RebaseTable;
