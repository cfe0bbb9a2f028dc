use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrcError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {field}: {details}")]
    ConfigValidation { field: String, details: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Resource not found: {resource_type}:{resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GrcError {
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn validation(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            details: details.into(),
        }
    }
}

/// Convert anyhow errors to GrcError
impl From<anyhow::Error> for GrcError {
    fn from(err: anyhow::Error) -> Self {
        GrcError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GrcError>;
