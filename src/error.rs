//! Error type shared by every layer of the application.
//!
//! User-correctable problems (bad amounts, missing fields, unknown ids) are
//! reported through [`AppError::Validation`], [`AppError::NotFound`] and
//! [`AppError::Conflict`]. Everything else wraps the failing library.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} with ID {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("terminal error: {0}")]
    Terminal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = AppError::not_found("Transaction", "abc");
        assert_eq!(err.to_string(), "Transaction with ID abc not found");
    }

    #[test]
    fn test_validation_message_is_passed_through() {
        let err = AppError::validation("Description too long");
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Description too long");
    }
}
