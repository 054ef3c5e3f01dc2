//! Centralized error type for the server.
//!
//! Using the `thiserror` crate, `ServerError` gives every layer — frame decoding, the
//! channel registry, the controller protocol, and configuration loading — one consistent
//! error type to return and for connection tasks to log and discard. Per-connection errors
//! never propagate to another connection or to the combiner; see the module docs on
//! [`crate::net`] for how callers contain them.

use thiserror::Error;

/// Convenience alias for results using [`ServerError`].
pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Header or payload length violated a framing invariant (e.g. not a multiple of 4).
    #[error("malformed frame: {0}")]
    BadFrame(String),

    /// A second client connected to a channel id that already has an owner.
    #[error("channel {0} is already connected")]
    SlotBusy(u8),

    /// A phase-shift vector from the controller didn't match the expected length.
    #[error("controller protocol error: {0}")]
    ControllerProtocol(String),

    /// The peer closed the connection cleanly (EOF). Not logged as a failure.
    #[error("peer closed the connection")]
    PeerClosed,

    /// Underlying transport error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),
}

impl ServerError {
    /// True for errors that only ever close the one connection that raised them.
    pub fn is_connection_local(&self) -> bool {
        !matches!(self, ServerError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_message_is_preserved() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: ServerError = io_err.into();
        assert!(err.to_string().contains("pipe gone"));
    }

    #[test]
    fn connection_local_classification() {
        assert!(ServerError::BadFrame("x".into()).is_connection_local());
        assert!(ServerError::SlotBusy(3).is_connection_local());
        assert!(ServerError::PeerClosed.is_connection_local());
        assert!(!ServerError::Configuration("bad".into()).is_connection_local());
    }
}
