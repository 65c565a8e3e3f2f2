use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use asset_rebase::logging::{self, LogFormat};
use asset_rebase::{RebaseConfig, RebasePlugin, host};

/// Rebase the asset imports of a module into content-hashed files next to the output.
#[derive(Debug, Parser)]
#[command(name = "asset-rebase", version, about)]
struct Cli {
  /// Entry module to scan for asset imports.
  #[arg(short, long)]
  input: PathBuf,
  /// Output file; assets are emitted relative to its directory.
  #[arg(short, long)]
  output: PathBuf,
  /// Configuration file. Defaults to `rebase.config.json` in the working directory.
  #[arg(short, long)]
  config: Option<PathBuf>,
  /// Sub folder receiving the rebased assets.
  #[arg(long)]
  folder: Option<String>,
  /// Keep the original file stem in front of the hash.
  #[arg(long)]
  keep_name: bool,
  /// Report every emitted asset.
  #[arg(short, long)]
  verbose: bool,
  /// Log output format.
  #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
  log_format: LogFormat,
}

impl Cli {
  fn load_config(&self) -> Result<RebaseConfig> {
    let mut config = match &self.config {
      Some(path) => {
        if !path.is_file() {
          bail!("config file {} does not exist", path.display());
        }
        RebaseConfig::from_path(path).with_context(|| format!("failed to parse {}", path.display()))?
      }
      None => RebaseConfig::discover(&std::env::current_dir()?),
    };

    if let Some(folder) = &self.folder {
      config = config.with_folder(folder.clone());
    }
    if self.keep_name {
      config = config.with_keep_name(true);
    }
    if self.verbose {
      config = config.with_verbose(true);
    }
    Ok(config)
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = cli.load_config()?;
  logging::init(config.verbose, cli.log_format);

  let plugin = RebasePlugin::new(config)?;
  let report = host::bundle(&plugin, &cli.input, &cli.output).await?;

  info!(
    "wrote {} with {} rebased imports ({} assets emitted)",
    report.output_file.display(),
    report.rewrites.len(),
    plugin.table().len()
  );
  Ok(())
}
