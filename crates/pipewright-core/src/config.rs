//! Configuration schema (pipewright.toml)

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the disambiguation counter
pub const COUNTER_PLACEHOLDER: &str = "{n}";

/// How generated column names are disambiguated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Suffix appended to a colliding generated name; `{n}` is the counter
    #[serde(default = "default_collision_suffix")]
    pub collision_suffix: String,
}

fn default_collision_suffix() -> String {
    " ({n})".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            collision_suffix: default_collision_suffix(),
        }
    }
}

impl NamingConfig {
    /// Apply the suffix template to a base name
    ///
    /// A template without `{n}` gets the counter appended, so distinct
    /// counters always yield distinct names.
    pub fn disambiguate(&self, base: &str, counter: usize) -> String {
        if self.collision_suffix.contains(COUNTER_PLACEHOLDER) {
            format!(
                "{}{}",
                base,
                self.collision_suffix.replace(COUNTER_PLACEHOLDER, &counter.to_string())
            )
        } else {
            format!("{}{}{}", base, self.collision_suffix, counter)
        }
    }
}

/// Structural checks performed when compiling a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// The root pipeline must read at least one source column
    #[serde(default = "default_true")]
    pub require_source_columns: bool,

    /// The root pipeline must contain at least one analyzer
    #[serde(default = "default_true")]
    pub require_analyzers: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_source_columns: true,
            require_analyzers: true,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Column naming
    #[serde(default)]
    pub naming: NamingConfig,

    /// Job validation
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl BuilderConfig {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: BuilderConfig = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject settings the builder cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.naming.collision_suffix.contains(COUNTER_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue(format!(
                "naming.collision_suffix must contain {}",
                COUNTER_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
