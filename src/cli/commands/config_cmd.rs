//! Configuration commands.

use crate::config::{Config, Settings};

use super::print_json;

/// Print the effective settings and where they came from.
pub fn cmd_config_show(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => eprintln!("Config file: {}", path.display()),
        None => eprintln!("No config file found, using defaults"),
    }
    print_json(&settings.summary())
}
