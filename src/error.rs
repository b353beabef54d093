//! Error taxonomy for the connection lifecycle
//!
//! Transient errors are absorbed and retried inside the multiplexer and
//! only surface as progress events; terminal errors surface to callers as
//! "unavailable" / "not found" results, never as panics.

use thiserror::Error;

/// Errors produced by the tunnel transport collaborator.
///
/// The variant decides how the lifecycle reacts: `Config` is fatal,
/// `Transient` is retried per policy, `SessionBroken` triggers
/// reconnection of the whole session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Bad credentials or key material; retrying cannot help
    #[error("configuration error: {0}")]
    Config(String),

    /// Dial or channel-open failure that may succeed on retry
    #[error("transient connection error: {0}")]
    Transient(String),

    /// EOF or timeout consistent with the established session being dead
    #[error("tunnel session broken: {0}")]
    SessionBroken(String),
}

impl TransportError {
    pub fn is_session_broken(&self) -> bool {
        matches!(self, TransportError::SessionBroken(_))
    }
}

/// Terminal outcomes of the establishment sequence
#[derive(Debug, Error)]
pub enum EstablishError {
    /// Key material could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// The bounded retry budget was exhausted
    #[error("retry limit reached while {0}")]
    RetryLimitExceeded(&'static str),

    /// The route has no tunnel or backend address to connect to
    #[error("route is missing {0}")]
    IncompleteRoute(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_broken_classification() {
        assert!(TransportError::SessionBroken("eof".into()).is_session_broken());
        assert!(!TransportError::Transient("refused".into()).is_session_broken());
        assert!(!TransportError::Config("bad key".into()).is_session_broken());
    }

    #[test]
    fn test_display_messages() {
        let err = EstablishError::RetryLimitExceeded("connecting");
        assert_eq!(err.to_string(), "retry limit reached while connecting");

        let err = TransportError::Config("failed to parse key".into());
        assert_eq!(err.to_string(), "configuration error: failed to parse key");
    }
}
