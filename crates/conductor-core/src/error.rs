use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for conductor operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur across the conductor system.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A model provider encountered an error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// No providers are registered, or every registered provider is
    /// blocked by an open circuit breaker.
    #[error("No model providers available ({registered} registered)")]
    NoProvidersAvailable {
        /// Number of providers registered at the time of the failure.
        registered: usize,
    },

    /// Every fallback attempt was exhausted without a successful response.
    #[error("All model providers failed after {attempts} attempts. Last error: {last_error}")]
    AllProvidersFailed {
        /// Number of distinct providers tried.
        attempts: usize,
        /// Message of the last underlying provider error.
        last_error: String,
    },

    /// Model provider returned an invalid response.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient errors like network failures or
    /// provider-side errors. Exhaustion errors are terminal: retrying
    /// `AllProvidersFailed` would repeat the same fallback loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Provider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = Error::Config("invalid config".to_owned());
        assert_eq!(error.to_string(), "Configuration error: invalid config");

        let error = Error::Provider("model failed".to_owned());
        assert_eq!(error.to_string(), "Provider error: model failed");

        let error = Error::NoProvidersAvailable { registered: 2 };
        assert_eq!(
            error.to_string(),
            "No model providers available (2 registered)"
        );

        let error = Error::AllProvidersFailed {
            attempts: 3,
            last_error: "timeout".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "All model providers failed after 3 attempts. Last error: timeout"
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::Provider("timeout".to_owned()).is_retryable());

        assert!(!Error::Config("bad config".to_owned()).is_retryable());
        assert!(!Error::NoProvidersAvailable { registered: 0 }.is_retryable());
        assert!(
            !Error::AllProvidersFailed {
                attempts: 3,
                last_error: "x".to_owned(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
