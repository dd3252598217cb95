//! Error types for the Amber Electric client
//!
//! Every fallible operation in the crate returns [`AmberError`]. The variants
//! separate configuration mistakes, rejected credentials, a missing session,
//! transport failures and undecodable responses so callers can pick a retry
//! policy without string matching.

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, AmberError>;

/// Main error type for the client
#[derive(Debug, Error)]
pub enum AmberError {
    /// Missing or unusable construction parameters
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A single configuration field failed validation
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Credentials rejected, or the session was refused upstream
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// A session-scoped update was attempted before authenticating
    #[error("Session required: {message}")]
    SessionRequired { message: String },

    /// Transport failure: timeout, connection error or non-success status
    #[error("Fetch error: {message}")]
    Fetch { message: String, status: Option<u16> },

    /// A response arrived but could not be decoded into the expected shape
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The configured location did not resolve to a usable market postcode
    #[error("Location error: {message}")]
    Location { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors for local files
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl AmberError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AmberError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AmberError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        AmberError::Auth {
            message: message.into(),
        }
    }

    /// Create a new session-required error
    pub fn session_required<S: Into<String>>(message: S) -> Self {
        AmberError::SessionRequired {
            message: message.into(),
        }
    }

    /// Create a new fetch error without an HTTP status
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        AmberError::Fetch {
            message: message.into(),
            status: None,
        }
    }

    /// Create a new fetch error for a non-success HTTP status
    pub fn fetch_status<S: Into<String>>(status: u16, message: S) -> Self {
        AmberError::Fetch {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AmberError::Fetch {
            message: format!("timed out: {}", message.into()),
            status: None,
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        AmberError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new location error
    pub fn location<S: Into<String>>(message: S) -> Self {
        AmberError::Location {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AmberError::Io {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same call with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, AmberError::Fetch { .. })
    }

    /// Whether the error stems from construction parameters
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AmberError::Config { .. } | AmberError::Validation { .. }
        )
    }

    /// HTTP status attached to a fetch error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            AmberError::Fetch { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for AmberError {
    fn from(err: std::io::Error) -> Self {
        AmberError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AmberError {
    fn from(err: serde_yaml::Error) -> Self {
        AmberError::Serialization {
            message: err.to_string(),
        }
    }
}

// JSON only crosses the wire; a body that fails to decode is a protocol fault.
impl From<serde_json::Error> for AmberError {
    fn from(err: serde_json::Error) -> Self {
        AmberError::protocol(err.to_string())
    }
}

impl From<reqwest::Error> for AmberError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AmberError::timeout(err.to_string())
        } else if err.is_decode() {
            AmberError::protocol(err.to_string())
        } else {
            AmberError::Fetch {
                message: err.to_string(),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }
}
