//! Subscriber setup for the command line tool.
//!
//! The library itself only emits `tracing` events; installing a subscriber is left to
//! binaries and hosts.

use std::io;

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
  /// Multi-line, colored output.
  Pretty,
  /// Single-line output.
  #[default]
  Compact,
  /// Newline-delimited JSON for tool integration.
  Json,
}

/// Default filter directive; `RUST_LOG` takes precedence when set.
pub fn default_directive(verbose: bool) -> &'static str {
  if verbose { "asset_rebase=debug,info" } else { "asset_rebase=info,warn" }
}

/// Install the global subscriber writing to stderr.
///
/// Calling this more than once keeps the first subscriber.
pub fn init(verbose: bool, format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

  let layer = format_layer(format).with_filter(filter);
  if tracing_subscriber::registry().with(layer).try_init().is_err() {
    tracing::debug!("a global subscriber was already installed");
  }
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
  match format {
    LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
    LogFormat::Compact => fmt::layer()
      .compact()
      .with_target(false)
      .with_writer(io::stderr)
      .boxed(),
    LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
  }
}
