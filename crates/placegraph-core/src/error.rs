use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacegraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Update callback failed for record {id}: {message}")]
    Callback { id: i64, message: String },

    #[error("Spatial query error: {0}")]
    Spatial(String),

    #[error("Feature store error: {0}")]
    Store(String),

    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record not found: {0}")]
    NotFound(i64),
}

impl PlacegraphError {
    /// Only callback failures can be skipped during a cascade; everything
    /// else aborts it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PlacegraphError::Callback { .. })
    }

    pub fn callback(id: i64, message: impl Into<String>) -> Self {
        PlacegraphError::Callback {
            id,
            message: message.into(),
        }
    }
}

impl From<crate::config_manager::ConfigError> for PlacegraphError {
    fn from(err: crate::config_manager::ConfigError) -> Self {
        PlacegraphError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlacegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_callback_failures_are_recoverable() {
        assert!(!PlacegraphError::callback(1, "disk full").is_fatal());
        assert!(PlacegraphError::Configuration("no repo".into()).is_fatal());
        assert!(PlacegraphError::Spatial("timeout".into()).is_fatal());
        assert!(PlacegraphError::NotFound(7).is_fatal());
    }
}
