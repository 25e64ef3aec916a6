//! Configuration management for `hotswap.toml`.
//!
//! # Sections
//!
//! | Section          | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `[instrument]`   | Names used by injected registration/restore code |
//! | `[classify]`     | Render-construction callee names                 |
//! | `[watch]`        | Source root, output dir, extensions, debounce    |
//!
//! A missing config file is not an error: every section has defaults.

mod error;
mod schema;

pub use error::ConfigError;
pub use schema::{ClassifyConfig, InstrumentConfig, WatchConfig};

use crate::log;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing hotswap.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotswapConfig {
    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    pub instrument: InstrumentConfig,
    pub classify: ClassifyConfig,
    pub watch: WatchConfig,
}

impl HotswapConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist. The project root is the config file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(
                || std::env::current_dir().unwrap_or_default(),
                Path::to_path_buf,
            );

        let mut config = if path.exists() {
            Self::from_path(path)?
        } else {
            crate::debug!("config"; "{} not found, using defaults", path.display());
            Self::default()
        };

        config.root = root;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            log!("warning"; "unknown fields in {}, ignoring: {}", path.display(), ignored.join(", "));
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Reject values the instrumentor or watcher cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let idents = [
            ("instrument.current_node_fn", &self.instrument.current_node_fn),
            ("instrument.render_method", &self.instrument.render_method),
            ("instrument.client_module", &self.instrument.client_module),
            ("instrument.runtime_module", &self.instrument.runtime_module),
        ];
        for (field, value) in idents {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if !is_identifier(&self.instrument.current_node_fn) {
            return Err(ConfigError::invalid(
                "instrument.current_node_fn",
                format!("`{}` is not a valid identifier", self.instrument.current_node_fn),
            ));
        }
        if self.classify.render_callees.is_empty() {
            return Err(ConfigError::invalid(
                "classify.render_callees",
                "at least one render callee is required",
            ));
        }
        if self.watch.extensions.is_empty() {
            return Err(ConfigError::invalid("watch.extensions", "must not be empty"));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid("watch.debounce_ms", "must be positive"));
        }
        Ok(())
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Absolute watch root.
    pub fn watch_root(&self) -> PathBuf {
        self.root_join(&self.watch.root)
    }

    /// Absolute output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.root_join(&self.watch.out_dir)
    }
}

/// JS identifier check (ASCII subset is enough for generated names).
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
pub fn test_parse_config(content: &str) -> HotswapConfig {
    let (parsed, ignored) = HotswapConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
