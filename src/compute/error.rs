//! Error types for the compute API client.

use thiserror::Error;

use crate::state::StateDecodeError;

/// Errors raised by the compute API client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Raised when the client configuration is incomplete.
    #[error("compute client configuration error: {0}")]
    Config(String),
    /// Raised when the request never produced an HTTP response.
    #[error("compute API transport failure: {message}")]
    Transport {
        /// Message reported by the HTTP client.
        message: String,
    },
    /// Raised when the compute API rejects a request.
    #[error("compute API returned status {status}: {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, lossily decoded for diagnostics.
        message: String,
    },
    /// Raised when a response body cannot be parsed.
    #[error("failed to parse compute API response: {message}")]
    Payload {
        /// Parser error message.
        message: String,
    },
    /// Raised when a resource reports a state outside the documented set.
    ///
    /// This signals a provider contract change and is fatal; callers must
    /// not retry it.
    #[error("provider reported an unrecognised state for {resource_id}: {source}")]
    UnrecognisedState {
        /// Resource whose state could not be decoded.
        resource_id: String,
        /// Underlying decode failure.
        source: StateDecodeError,
    },
}

impl From<reqwest::Error> for ComputeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}
