use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Email error: {0}")]
    EmailError(String),
}

impl NotifierError {
    /// Whether a run may carry on after this error.
    ///
    /// Page loads, element extraction and mail delivery are best effort;
    /// the match store and configuration are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            NotifierError::BrowserError(_) => true,
            NotifierError::ParseError(_) => true,
            NotifierError::EmailError(_) => true,
            NotifierError::StorageError(_) => false,
            NotifierError::ConfigError(_) => false,
        }
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for NotifierError {
    fn from(err: std::io::Error) -> Self {
        NotifierError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for NotifierError {
    fn from(err: serde_json::Error) -> Self {
        NotifierError::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for NotifierError {
    fn from(err: toml::de::Error) -> Self {
        NotifierError::ConfigError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for NotifierError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        NotifierError::BrowserError(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for NotifierError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotifierError::EmailError(err.to_string())
    }
}
