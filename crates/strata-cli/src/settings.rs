//! Layered settings: an optional TOML file under `STRATA_*` environment
//! variables.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::ValueEnum;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// `chrono` format string for date values.
  #[serde(default = "default_date_format")]
  pub date_format:  String,
  #[serde(default)]
  pub output:       OutputFormat,
  /// Print every history frame, not only the changes since the baseline.
  #[serde(default = "default_show_history")]
  pub show_history: bool,
}

fn default_date_format() -> String { "%Y-%m-%d".to_string() }

fn default_show_history() -> bool { true }

impl Default for Settings {
  fn default() -> Self {
    Self {
      date_format:  default_date_format(),
      output:       OutputFormat::default(),
      show_history: default_show_history(),
    }
  }
}

impl Settings {
  pub fn load(path: PathBuf) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("STRATA"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }
}
