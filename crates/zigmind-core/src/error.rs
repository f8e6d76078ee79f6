//! Unified error handling for ZigMind.
//!
//! Library layers carry their own error enums (`TransportError`,
//! `DeviceError`); this type covers configuration and bootstrap failures and
//! is what the other crates convert into at the process edge.

/// Unified error type for ZigMind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (config files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Parse errors with location context.
    #[error("Parse error at {location}: {message}")]
    Parse { location: String, message: String },
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

/// Build an `Error::Config` from a message or format string.
#[macro_export]
macro_rules! config_err {
    ($msg:expr) => {
        $crate::error::Error::Config($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Config(format!($fmt, $($arg)*))
    };
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse {
            location: err
                .span()
                .map(|span| format!("bytes {}..{}", span.start, span.end))
                .unwrap_or_else(|| "unknown".to_string()),
            message: err.message().to_string(),
        }
    }
}
