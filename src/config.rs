use crate::error::Result;
use serde::Deserialize;
use std::env;
use std::fs;

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "data/ffid_ingest.db".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from `config.toml`, falling back to defaults when
    /// the file is absent. `FFID_DATABASE_PATH` overrides the file value.
    pub fn load() -> Result<Self> {
        let mut config = match fs::read_to_string(CONFIG_PATH) {
            Ok(content) => toml::from_str::<Config>(&content)?,
            Err(_) => Config::default(),
        };

        if let Ok(path) = env::var("FFID_DATABASE_PATH") {
            config.database_path = path;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let config = Config::default();
        assert!(config.database_path.ends_with(".db"));
        assert!(!config.log_dir.is_empty());
    }
}
