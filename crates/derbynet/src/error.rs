//! DerbyNet protocol error types

use thiserror::Error;

/// Protocol session errors
#[derive(Debug, Error)]
pub enum DerbyNetError {
    /// Request could not be delivered or the reply could not be read
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Reply document is not a well-formed action response
    #[error("malformed response: {message}")]
    Parse { message: String },

    /// Login failed; the session cannot proceed
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Message sent before `authenticate`
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// FINISHED requested without a current, non-aborted heat
    #[error("no active heat to report")]
    NoActiveHeat,

    /// Session already sent its termination notice
    #[error("session is terminating")]
    Terminating,
}

impl DerbyNetError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Whether the process should stop rather than retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DerbyNetError>;
