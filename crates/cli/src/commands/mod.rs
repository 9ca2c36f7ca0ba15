pub mod agents;
pub mod check;
pub mod parse;
pub mod run;

use std::path::PathBuf;

use chorus_config::AppConfig;

/// The config file to use: `--config`/`CHORUS_CONFIG`, else the default.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(AppConfig::default_path)
}
