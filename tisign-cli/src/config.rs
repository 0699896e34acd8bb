//! TOML configuration file support.
//!
//! Supplies defaults the CLI flags can override; never required.

use std::fs;
use std::path::Path;

use failure::Error;
use serde_derive::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub key_dir: Option<String>,
    pub hash_type: Option<String>,
    #[serde(default)]
    pub ignore_warnings: bool,
    #[serde(default)]
    pub remove_old_signature: bool,
    #[serde(default)]
    pub fix_page_count: bool,
    #[serde(default)]
    pub fix_os_size: bool,
    #[serde(default)]
    pub zealously_pad: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}
