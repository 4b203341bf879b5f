//! Error types surfaced by the client.
//!
//! Nothing here is raised across the transport boundary: request failures
//! travel back through the acknowledgement callback as [`RequestError`], and
//! malformed inbound stream packets are logged and dropped.

use serde_json::Value;
use thiserror::Error;

use bidio_config::AddressError;

/// Errors raised while encoding or decoding packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The packet could not be represented as JSON.
    #[error("failed to encode packet: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The message did not have the packet shape.
    #[error("failed to decode packet: {message}")]
    Deserialize {
        /// Human-readable description of the mismatch.
        message: String,
        /// Underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl CodecError {
    /// Creates a decode error from a serde failure.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Deserialize {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Failure delivered to a request's reply callback.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with an `error` packet.
    #[error("server rejected the request: {payload}")]
    Remote {
        /// Error payload exactly as the server sent it.
        payload: Value,
    },

    /// The request or its acknowledgement could not be coded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl RequestError {
    /// Returns the server's error payload for [`RequestError::Remote`].
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Remote { payload } => Some(payload),
            Self::Codec(_) => None,
        }
    }
}

/// Errors raised by the channel manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The channel's address could not be composed.
    #[error("cannot address channel '{name}': {source}")]
    Address {
        /// Channel name that was requested.
        name: String,
        /// Underlying address failure.
        #[source]
        source: AddressError,
    },

    /// The configured base address is unusable.
    #[error("invalid server address: {0}")]
    BaseAddress(#[source] AddressError),
}
