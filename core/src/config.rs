//! Layered configuration.
//!
//! Precedence, later wins:
//! 1. Built-in defaults
//! 2. `{config_home}/config.toml`
//! 3. `GARAGE_*` environment variables
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```toml
//! data_dir = "/var/lib/motogarage"
//! owner = "alice"
//! log_filter = "garage_core=debug"
//!
//! [image]
//! max_size_bytes = 1048576
//! max_dimension = 1920
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::image::ImageLimits;
use crate::model::OwnerId;
use crate::{APP_DIRNAME, default_data_dir};

pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_HOME: &str = "GARAGE_HOME";
pub const ENV_DATA_DIR: &str = "GARAGE_DATA_DIR";
pub const ENV_OWNER: &str = "GARAGE_OWNER";
pub const ENV_LOG: &str = "GARAGE_LOG";
pub const ENV_IMAGE_MAX_BYTES: &str = "GARAGE_IMAGE_MAX_BYTES";
pub const ENV_IMAGE_MAX_DIMENSION: &str = "GARAGE_IMAGE_MAX_DIMENSION";

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for ${var}: {value:?} (expected {expected})")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GarageConfig {
    /// Directory holding `config.toml`.
    pub config_home: PathBuf,
    /// Root of the file-backed record and blob stores.
    pub data_dir: PathBuf,
    /// Owner signed in by default.
    pub owner: Option<OwnerId>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub image: ImageLimits,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    owner: Option<String>,
    log_filter: Option<String>,
    #[serde(default)]
    image: ImageSection,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSection {
    max_size_bytes: Option<u64>,
    max_dimension: Option<u32>,
}

/// Builder for [`GarageConfig`].
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_home: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    skip_file: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` instead of `$GARAGE_HOME` or the platform config directory.
    pub fn with_config_home(mut self, path: PathBuf) -> Self {
        self.config_home = Some(path);
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn skip_file_layer(mut self) -> Self {
        self.skip_file = true;
        self
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|v| !v.trim().is_empty())
    }

    fn resolve_config_home(&self) -> PathBuf {
        if let Some(path) = &self.config_home {
            return path.clone();
        }
        if let Some(path) = self.var(ENV_HOME) {
            return PathBuf::from(path);
        }
        match dirs::config_dir() {
            Some(dir) => dir.join(APP_DIRNAME),
            None => PathBuf::from(format!(".{APP_DIRNAME}")),
        }
    }

    pub fn load(self) -> Result<GarageConfig, ConfigError> {
        let config_home = self.resolve_config_home();
        let mut config = GarageConfig {
            config_home: config_home.clone(),
            data_dir: default_data_dir(),
            owner: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            image: ImageLimits::default(),
        };

        if !self.skip_file {
            let file = load_file(&config_home)?;
            apply_file(&mut config, file);
        }
        self.apply_env(&mut config)?;

        validate(&config)?;
        Ok(config)
    }

    fn apply_env(&self, config: &mut GarageConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.var(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(owner) = self.var(ENV_OWNER) {
            config.owner = Some(OwnerId::new(owner));
        }
        if let Some(filter) = self.var(ENV_LOG) {
            config.log_filter = filter;
        }
        if let Some(value) = self.var(ENV_IMAGE_MAX_BYTES) {
            config.image.max_size_bytes = parse_env(ENV_IMAGE_MAX_BYTES, &value)?;
        }
        if let Some(value) = self.var(ENV_IMAGE_MAX_DIMENSION) {
            config.image.max_dimension = parse_env(ENV_IMAGE_MAX_DIMENSION, &value)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
            expected: "a positive integer",
        })
}

/// Parse `{config_home}/config.toml`; a missing file is an empty layer.
fn load_file(config_home: &Path) -> Result<ConfigFile, ConfigError> {
    let path = config_home.join(CONFIG_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} not found, using defaults", path.display());
            return Ok(ConfigFile::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let mut file: ConfigFile =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    // Relative data directories are anchored at the config home.
    if let Some(dir) = file.data_dir.take() {
        file.data_dir = Some(if dir.is_relative() {
            config_home.join(dir)
        } else {
            dir
        });
    }
    Ok(file)
}

fn apply_file(config: &mut GarageConfig, file: ConfigFile) {
    if let Some(dir) = file.data_dir {
        config.data_dir = dir;
    }
    if let Some(owner) = file.owner.filter(|o| !o.trim().is_empty()) {
        config.owner = Some(OwnerId::new(owner));
    }
    if let Some(filter) = file.log_filter {
        config.log_filter = filter;
    }
    if let Some(bytes) = file.image.max_size_bytes {
        config.image.max_size_bytes = bytes;
    }
    if let Some(dimension) = file.image.max_dimension {
        config.image.max_dimension = dimension;
    }
}

fn validate(config: &GarageConfig) -> Result<(), ConfigError> {
    if config.image.max_size_bytes == 0 {
        return Err(ConfigError::Invalid(
            "image.max_size_bytes must be greater than zero".to_string(),
        ));
    }
    if config.image.max_dimension == 0 {
        return Err(ConfigError::Invalid(
            "image.max_dimension must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn loader(home: &Path, pairs: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::new()
            .with_config_home(home.to_path_buf())
            .with_env(env(pairs))
    }

    #[test]
    fn defaults_without_file_or_env() {
        let tmp = TempDir::new().unwrap();
        let config = loader(tmp.path(), &[]).load().unwrap();
        assert_eq!(config.config_home, tmp.path());
        assert_eq!(config.data_dir, default_data_dir());
        assert_eq!(config.owner, None);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.image, ImageLimits::default());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
data_dir = "garage-data"
owner = "alice"
log_filter = "debug"

[image]
max_dimension = 800
"#,
        )
        .unwrap();

        let config = loader(tmp.path(), &[]).load().unwrap();
        assert_eq!(config.data_dir, tmp.path().join("garage-data"));
        assert_eq!(config.owner, Some(OwnerId::new("alice")));
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.image.max_dimension, 800);
        assert_eq!(config.image.max_size_bytes, 1024 * 1024);
    }

    #[test]
    fn env_layer_overrides_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "owner = \"alice\"\n").unwrap();

        let config = loader(
            tmp.path(),
            &[
                (ENV_OWNER, "bob"),
                (ENV_DATA_DIR, "/srv/garage"),
                (ENV_IMAGE_MAX_BYTES, "2048"),
            ],
        )
        .load()
        .unwrap();
        assert_eq!(config.owner, Some(OwnerId::new("bob")));
        assert_eq!(config.data_dir, PathBuf::from("/srv/garage"));
        assert_eq!(config.image.max_size_bytes, 2048);
    }

    #[test]
    fn home_comes_from_env_when_not_explicit() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().to_string_lossy().to_string();
        let config = ConfigLoader::new()
            .with_env(env(&[(ENV_HOME, home.as_str())]))
            .load()
            .unwrap();
        assert_eq!(config.config_home, tmp.path());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = loader(tmp.path(), &[(ENV_IMAGE_MAX_DIMENSION, "wide")])
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvValue { .. }));

        let err = loader(tmp.path(), &[(ENV_IMAGE_MAX_BYTES, "0")])
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "owner = [").unwrap();
        let err = loader(tmp.path(), &[]).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn skipping_file_layer_ignores_it() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "owner = \"alice\"\n").unwrap();
        let config = loader(tmp.path(), &[]).skip_file_layer().load().unwrap();
        assert_eq!(config.owner, None);
    }
}
