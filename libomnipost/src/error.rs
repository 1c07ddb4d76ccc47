//! Error types for Omnipost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmnipostError>;

#[derive(Error, Debug)]
pub enum OmnipostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OmnipostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnipostError::InvalidInput(_) => 3,
            OmnipostError::Publish(PublishError::Authentication(_)) => 2,
            OmnipostError::Publish(_) => 1,
            OmnipostError::Config(_) => 1,
            OmnipostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Errors from a platform publish attempt.
///
/// `Clone` so a result can be recorded on the target row and still be
/// logged by the caller.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Platform API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl PublishError {
    /// Whether a retry could plausibly succeed. Authentication, validation,
    /// and definitive API rejections never benefit from retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::Network(_) | PublishError::RateLimit(_) | PublishError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PublishError::Timeout(e.to_string())
        } else {
            PublishError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = OmnipostError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = OmnipostError::Publish(PublishError::Authentication("Expired token".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_publish_errors() {
        for publish_error in [
            PublishError::Validation("too long".to_string()),
            PublishError::Api("400 Bad Request".to_string()),
            PublishError::Network("connection refused".to_string()),
            PublishError::RateLimit("try later".to_string()),
            PublishError::Timeout("30s elapsed".to_string()),
        ] {
            let error = OmnipostError::Publish(publish_error);
            assert_eq!(error.exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = OmnipostError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_database_error() {
        let error = OmnipostError::Database(DbError::NotFound("post abc".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(PublishError::Network("reset".to_string()).is_transient());
        assert!(PublishError::RateLimit("429".to_string()).is_transient());
        assert!(PublishError::Timeout("too slow".to_string()).is_transient());

        assert!(!PublishError::Authentication("401".to_string()).is_transient());
        assert!(!PublishError::Validation("empty".to_string()).is_transient());
        assert!(!PublishError::Api("500".to_string()).is_transient());
    }

    #[test]
    fn test_error_message_formatting_invalid_input() {
        let error = OmnipostError::InvalidInput("Content cannot be empty".to_string());
        assert_eq!(format!("{}", error), "Invalid input: Content cannot be empty");
    }

    #[test]
    fn test_error_message_formatting_publish() {
        let error = OmnipostError::Publish(PublishError::Api("tweet rejected".to_string()));
        assert_eq!(
            format!("{}", error),
            "Publish error: Platform API error: tweet rejected"
        );
    }

    #[test]
    fn test_error_message_formatting_db_invalid_state() {
        let error = DbError::InvalidState("post already posted".to_string());
        assert_eq!(format!("{}", error), "Invalid state: post already posted");
    }

    #[test]
    fn test_error_conversion_from_config_error() {
        let config_error = ConfigError::MissingField("test".to_string());
        let error: OmnipostError = config_error.into();
        assert!(matches!(error, OmnipostError::Config(_)));
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let error: OmnipostError = db_error.into();
        assert!(matches!(error, OmnipostError::Database(_)));
    }

    #[test]
    fn test_error_conversion_from_publish_error() {
        let publish_error = PublishError::Network("test".to_string());
        let error: OmnipostError = publish_error.into();
        assert!(matches!(error, OmnipostError::Publish(_)));
    }

    #[test]
    fn test_publish_error_clone() {
        let original = PublishError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<String> {
            Ok("success".to_string())
        }

        fn returns_err() -> Result<String> {
            Err(OmnipostError::InvalidInput("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_validation_error_with_details() {
        let error = PublishError::Validation(
            "Content exceeds twitter's 280 character limit (current: 411 characters)".to_string(),
        );
        let message = format!("{}", error);
        assert!(message.contains("280"));
        assert!(message.contains("411"));
        assert!(message.contains("character limit"));
    }
}
