//! Hub configuration.
//!
//! # Responsibility
//! - Describe which project a hub serves and its data-change policy.
//! - Load and validate configuration from JSON.
//!
//! # Invariants
//! - `project_name` is never blank after validation.
//! - Configuration is an explicit value; there is no process-global state.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Per-hub configuration shared with every entity of the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HubConfig {
    /// Name (and id) of the project served by the hub.
    pub project_name: String,
    /// When `false`, the free-form `data` blob is neither queried nor sent.
    #[serde(default)]
    pub allow_data_changes: bool,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    BlankProjectName,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid hub config: {err}"),
            Self::BlankProjectName => write!(f, "project_name must not be blank"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::BlankProjectName => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl HubConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            allow_data_changes: false,
        }
    }

    pub fn with_data_changes(mut self, allow_data_changes: bool) -> Self {
        self.allow_data_changes = allow_data_changes;
        self
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(input)?;
        config.project_name = config.project_name.trim().to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::BlankProjectName);
        }
        Ok(())
    }
}
