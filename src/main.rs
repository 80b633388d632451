use clap::{Parser, Subcommand};
use gristmill::{config, instance, toolchain};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gristmill")]
#[command(about = "Configurable build pipeline for static sites")]
#[command(long_about = "\
Configurable build pipeline for static sites

The config file is the pipeline: every stage is gated by the presence of its
table in gristmill.toml, and the stage order is fixed. A build clones the
source tree into a working directory, runs the enabled stages in order, and
atomically swaps the result into the distribution directory.

Stage order:

  lint-scripts, lint-styles        # read src/, fail the build on violations
  setup                            # clone src/ into the working directory
  templates, styles                # render into the working directory
  collect-assets                   # concatenate build: blocks in markup
  minify-scripts, minify-markup,
  prune-styles, minify-styles      # rewrite in place
  sitemap, icon-manifest           # generated artifacts
  generate-images, optimize-images # raster work
  revision                         # content fingerprints in filenames
  finalize                         # atomic swap into dist/
  validate-markup, report          # read the finished dist/

Run 'gristmill gen-config' to generate a documented gristmill.toml.")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "gristmill.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline once
    Build,
    /// Build, then rebuild on source changes
    Serve,
    /// Show which stages the config enables, in order
    Plan,
    /// Print a stock gristmill.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build => {
            let config = config::load_config(&cli.config, None)?;
            let mut instance =
                instance::BuildInstance::new(config, toolchain::Toolchain::default())?;
            instance.build()?;
        }
        Command::Serve => {
            let config = config::load_config(&cli.config, None)?;
            let mut instance =
                instance::BuildInstance::new(config, toolchain::Toolchain::default())?;
            instance.serve()?;
        }
        Command::Plan => {
            let config = config::load_config(&cli.config, None)?;
            let instance =
                instance::BuildInstance::new(config, toolchain::Toolchain::default())?;
            for kind in instance.plan() {
                println!("{}", kind.name());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }
    Ok(())
}
