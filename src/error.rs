//! Manager error types

use thiserror::Error;

use crate::message::MessageError;

/// An operation targeted a relay the manager cannot use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// No relay is registered under the given url.
    #[error("invalid relay url: no connection to {0}")]
    UnknownRelay(String),

    /// The relay's policy forbids reading from it.
    #[error("could not send request: {0} is not configured to read from")]
    ReadDenied(String),
}

/// An outbound event failed pre-publish validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The event carries no signature.
    #[error("could not publish {0}: must be signed")]
    Unsigned(String),

    /// The event's signature did not verify.
    #[error("could not publish {0}: failed to verify signature")]
    BadSignature(String),
}

/// Transport-level failure on a single relay connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid relay URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Proxy handshake failure
    #[error("proxy error: {0}")]
    Proxy(String),

    /// Connect attempt timed out
    #[error("connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Not connected to relay
    #[error("not connected to relay")]
    NotConnected,

    /// Outbound message could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] MessageError),
}

/// Top-level error returned by [`RelayManager`](crate::RelayManager) operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Manager result type
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::UnknownRelay("wss://relay.example.com".to_string());
        assert!(err.to_string().contains("no connection to wss://relay.example.com"));

        let err = PolicyError::ReadDenied("wss://relay.example.com".to_string());
        assert!(err.to_string().contains("not configured to read from"));
    }

    #[test]
    fn test_manager_error_from_validation() {
        let err: ManagerError = ValidationError::Unsigned("abc".to_string()).into();
        assert!(matches!(err, ManagerError::Validation(ValidationError::Unsigned(_))));
        assert!(err.to_string().contains("must be signed"));
    }
}
