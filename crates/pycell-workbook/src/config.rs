use pycell_eval::EngineConfig;
use serde::{Deserialize, Serialize};

#[cfg(feature = "json")]
use crate::error::ConfigError;

/// How results are mirrored into the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the spreadsheet function in the recognized cell formula.
    pub function_name: String,
    /// Argument separator used when writing formulas (`;` or `,`).
    pub separator: char,
    /// Outline array regions with a border.
    pub decorate_borders: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            function_name: "PY".to_string(),
            separator: ';',
            decorate_borders: true,
        }
    }
}

impl SyncConfig {
    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_borders(mut self, on: bool) -> Self {
        self.decorate_borders = on;
        self
    }
}

/// Everything a [`Session`](crate::session::Session) needs at startup.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "json", serde(default))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub sync: SyncConfig,
}

#[cfg(feature = "json")]
impl SessionConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.sync.separator, ',' | ';') {
            return Err(ConfigError::Invalid(format!(
                "separator must be ',' or ';', got {:?}",
                self.sync.separator
            )));
        }
        if self.sync.function_name.trim().is_empty() {
            return Err(ConfigError::Invalid("function_name is empty".to_string()));
        }
        if self.engine.max_history == 0 {
            return Err(ConfigError::Invalid("max_history must be at least 1".to_string()));
        }
        Ok(())
    }
}
