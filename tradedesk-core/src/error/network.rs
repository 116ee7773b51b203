//! Network-related error types.
//!
//! Covers connection establishment, transport failures, remote closure,
//! exhausted reconnection and undecodable inbound frames.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network error type for the real-time connection layer.
///
/// # Examples
///
/// ```
/// use tradedesk_core::error::NetworkError;
///
/// let error = NetworkError::ConnectionClosed {
///     code: 1006,
///     reason: "abnormal closure".to_string(),
/// };
/// assert!(error.to_string().contains("1006"));
/// assert!(error.is_recoverable());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    /// Opening the connection failed.
    #[error("[Network] Connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for the connection failure.
        reason: String,
    },

    /// Opening the connection timed out.
    #[error("[Network] Connection timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// WebSocket protocol or transport error.
    #[error("[Network] WebSocket error: {reason}")]
    WebSocket {
        /// Reason for the WebSocket error.
        reason: String,
    },

    /// Connection was closed by the remote side or the network.
    #[error("[Network] Connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Automatic reconnection gave up.
    #[error("[Network] Reconnect attempts exhausted after {attempts} attempt(s)")]
    ReconnectExhausted {
        /// Number of attempts that were made.
        attempts: u32,
    },

    /// Inbound frame could not be decoded.
    #[error("[Network] Malformed payload: {reason}")]
    MalformedPayload {
        /// Reason the payload was rejected.
        reason: String,
    },

    /// Endpoint URL is not usable.
    #[error("[Network] Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Reason the URL was rejected.
        reason: String,
    },
}

impl NetworkError {
    /// Returns true if this error is recoverable (can be retried).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::WebSocket { .. }
                | Self::MalformedPayload { .. }
        )
    }

    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> super::ErrorSeverity {
        use super::ErrorSeverity;
        match self {
            Self::InvalidUrl { .. } | Self::ReconnectExhausted { .. } => ErrorSeverity::Fatal,
            Self::Timeout { .. }
            | Self::ConnectionFailed { .. }
            | Self::ConnectionClosed { .. }
            | Self::WebSocket { .. } => ErrorSeverity::Recoverable,
            Self::MalformedPayload { .. } => ErrorSeverity::Warning,
        }
    }

    /// Creates a connection failure error.
    #[must_use]
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Creates a WebSocket error.
    #[must_use]
    pub fn websocket(reason: impl Into<String>) -> Self {
        Self::WebSocket {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorSeverity;

    #[test]
    fn test_connection_failed() {
        let error = NetworkError::connection_failed("Connection refused");
        assert!(error.to_string().contains("Connection refused"));
        assert!(error.is_recoverable());
        assert_eq!(error.severity(), ErrorSeverity::Recoverable);
    }

    #[test]
    fn test_timeout() {
        let error = NetworkError::Timeout { timeout_ms: 5000 };
        assert!(error.to_string().contains("5000ms"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_reconnect_exhausted_is_fatal() {
        let error = NetworkError::ReconnectExhausted { attempts: 5 };
        assert!(error.to_string().contains("5 attempt"));
        assert!(!error.is_recoverable());
        assert!(error.severity().is_fatal());
    }

    #[test]
    fn test_malformed_payload_is_warning() {
        let error = NetworkError::MalformedPayload {
            reason: "expected value at line 1".to_string(),
        };
        assert_eq!(error.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_invalid_url() {
        let error = NetworkError::InvalidUrl {
            url: "http://example.com".to_string(),
            reason: "scheme must be ws or wss".to_string(),
        };
        assert!(error.to_string().contains("http://example.com"));
        assert!(!error.is_recoverable());
    }
}
