//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// No usable GPIO backend
    #[error("Hardware unavailable: {message}")]
    Hardware { message: String },

    /// The server refused or never answered the login
    #[error("Failed to log in to {server}: {message}")]
    Login { server: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    #[cfg_attr(feature = "real-gpio", allow(dead_code))]
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }

    pub fn login(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Login {
            server: server.into(),
            message: message.into(),
        }
    }
}
