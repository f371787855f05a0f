use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhenologyError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Operation not supported by this backend: {operation}")]
    Unsupported { operation: String },

    #[error("Raster error in {path}: {message}")]
    RasterError { path: String, message: String },

    #[error("Repository error: {message}")]
    RepositoryError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Background task failed: {message}")]
    TaskError { message: String },
}

/// Coarse classification used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    NotFound,
    Unsupported,
    Server,
}

impl PhenologyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn raster(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::RasterError {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        Self::RepositoryError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError { .. } | Self::InvalidConfigValueError { .. } => {
                ErrorCategory::Client
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            _ => ErrorCategory::Server,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.category() == ErrorCategory::Client
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ValidationError { message } => format!("Invalid input: {}", message),
            Self::NotFound { message } => format!("No data available: {}", message),
            Self::Unsupported { operation } => {
                format!("'{}' is not available with the configured storage backend", operation)
            }
            Self::ConfigError { message } => format!("Configuration problem: {}", message),
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Configuration field '{}' is invalid: {}", field, reason)
            }
            other => format!("Internal error: {}", other),
        }
    }
}

impl From<tokio::task::JoinError> for PhenologyError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskError {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PhenologyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            PhenologyError::validation("bad lat").category(),
            ErrorCategory::Client
        );
        assert!(PhenologyError::not_found("no stack").is_not_found());
        assert_eq!(
            PhenologyError::unsupported("get_area_stats").category(),
            ErrorCategory::Unsupported
        );
        assert_eq!(
            PhenologyError::repository("connection reset").category(),
            ErrorCategory::Server
        );
    }

    #[test]
    fn test_unsupported_message_names_operation() {
        let msg = PhenologyError::unsupported("get_area_stats").user_friendly_message();
        assert!(msg.contains("get_area_stats"));
    }
}
