use std::fmt;

#[derive(Debug)]
pub enum PeekError {
    ConfigError(String),
    SourceError(String),
    IoError(String),
    ParseError(String),
}

impl fmt::Display for PeekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeekError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            PeekError::SourceError(msg) => write!(f, "Source error: {}", msg),
            PeekError::IoError(msg) => write!(f, "IO error: {}", msg),
            PeekError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for PeekError {}

impl From<std::io::Error> for PeekError {
    fn from(err: std::io::Error) -> Self {
        PeekError::IoError(err.to_string())
    }
}

impl From<csv::Error> for PeekError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            PeekError::IoError(err.to_string())
        } else {
            PeekError::ParseError(err.to_string())
        }
    }
}

impl From<std::num::ParseIntError> for PeekError {
    fn from(err: std::num::ParseIntError) -> Self {
        PeekError::ParseError(err.to_string())
    }
}

impl From<chrono::ParseError> for PeekError {
    fn from(err: chrono::ParseError) -> Self {
        PeekError::ParseError(err.to_string())
    }
}

impl From<&str> for PeekError {
    fn from(msg: &str) -> Self {
        PeekError::ConfigError(msg.to_string())
    }
}

impl From<String> for PeekError {
    fn from(msg: String) -> Self {
        PeekError::ConfigError(msg)
    }
}

impl From<ctrlc::Error> for PeekError {
    fn from(err: ctrlc::Error) -> Self {
        PeekError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PeekError>;
