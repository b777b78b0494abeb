//! `strata`: replay edit scripts against versioned records.
//!
//! # Usage
//!
//! ```
//! strata replay demos/reconcile.toml
//! strata --output json replay demos/reconcile.toml
//! strata schema demos/reconcile.toml
//! ```
//!
//! Settings come from `strata.toml` (or `--config`) and `STRATA_*`
//! environment variables.

mod replay;
mod report;
mod script;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use report::{Report, SchemaListing};
use script::Script;
use serde::Serialize;
use settings::{OutputFormat, Settings};
use strata_core::SchemaRegistry;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay edits against versioned records")]
struct Cli {
  /// Path to the TOML settings file.
  #[arg(short, long, default_value = "strata.toml")]
  config: PathBuf,

  /// Output format; overrides the settings file.
  #[arg(short, long, value_enum)]
  output: Option<OutputFormat>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Build the script's record, apply its steps, and report the result.
  Replay {
    script: PathBuf,

    /// Only show changes since the baseline.
    #[arg(long)]
    no_history: bool,
  },
  /// List the fields each schema in a script declares.
  Schema { script: PathBuf },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  // Reports go to stdout, so logs go to stderr.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let mut settings = Settings::load(cli.config)?;
  if let Some(output) = cli.output {
    settings.output = output;
  }

  match cli.command {
    Command::Replay { script, no_history } => {
      if no_history {
        settings.show_history = false;
      }
      let script = Script::load(&script)?;
      let replay = replay::run(&script)?;
      let report = Report::build(replay, &settings)?;
      emit(&settings, &report, |r| print!("{r}"))
    }
    Command::Schema { script } => {
      let script = Script::load(&script)?;
      let registry = SchemaRegistry::new();
      script.register(&registry)?;
      let names: Vec<String> =
        script.schemas.iter().map(|def| def.name.clone()).collect();
      let listings = SchemaListing::collect(&registry, &names);
      emit(&settings, &listings, |listings| {
        for (i, listing) in listings.iter().enumerate() {
          if i > 0 {
            println!();
          }
          print!("{listing}");
        }
      })
    }
  }
}

fn emit<T: Serialize>(
  settings: &Settings,
  value: &T,
  text: impl FnOnce(&T),
) -> anyhow::Result<()> {
  match settings.output {
    OutputFormat::Text => text(value),
    OutputFormat::Json => {
      let json =
        serde_json::to_string_pretty(value).context("serialising output")?;
      println!("{json}");
    }
  }
  Ok(())
}
