use thiserror::Error;

/// Errors raised while preparing the runtime: configuration and logging
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid value for '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Environment error: {message}")]
    Environment { message: String },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl CoreError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
