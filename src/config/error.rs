//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    FileNotFound(String),

    #[error("config could not be parsed: {0}")]
    ParseError(String),

    /// `field` is the dotted key, e.g. `reaper.batch_size`
    #[error("invalid {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("{0}")]
    EnvVarError(String),

    /// `WARDEN_CONFIG_DIR` and `WARDEN_CONFIG_FILE` were both set
    #[error("conflicting config locations: {0}")]
    MutualExclusivityError(String),

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ConfigError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn file_not_found<S: Into<String>>(path: S) -> Self {
        ConfigError::FileNotFound(path.into())
    }

    pub fn mutual_exclusivity<S: Into<String>>(message: S) -> Self {
        ConfigError::MutualExclusivityError(message.into())
    }

    /// Dotted key of the offending setting, when known.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::ValidationError { field, .. } => Some(field),
            _ => None,
        }
    }
}
