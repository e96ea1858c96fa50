use thiserror::Error;

/// A payload failed schema validation.
///
/// Every boundary-crossing payload (stdin JSON, socket frames, host
/// submissions) is checked by the validator; this is the only error it
/// produces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ask request JSON must not be empty")]
    EmptyInput,

    #[error("invalid ask request JSON: {0}")]
    MalformedJson(String),

    #[error("invalid payload shape: {0}")]
    Shape(String),

    #[error("{path}: {message}")]
    Field { path: String, message: String },
}

impl ValidationError {
    pub(crate) fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::Field {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
