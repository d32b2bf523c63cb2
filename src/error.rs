//! Error types shared by the protocol engine.
//!
//! Protocol errors are recovered into an `ERROR <kind>` response line and
//! never end a session. Transport errors always end the session and are
//! only reported to the operator.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while parsing or dispatching a single command.
///
/// The `Display` form is the text that follows `ERROR ` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Blank or whitespace-only line.
    #[error("EmptyCommand")]
    EmptyCommand,
    /// Unrecognized command name; carries the outer-trimmed input.
    #[error("UnknownCommand: {0}")]
    UnknownCommand(String),
    /// `CAR` without a brand.
    #[error("MissingBrand")]
    MissingBrand,
    /// Lookup failure, timeout, cancellation or any unexpected fault.
    #[error("InternalError")]
    InternalError,
}

/// Socket-level failures. These terminate the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("no command received within {0:?}")]
    IdleTimeout(Duration),

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl TransportError {
    /// True when the peer simply went away (reset, broken pipe, ...).
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_wire_text() {
        assert_eq!(ProtocolError::EmptyCommand.to_string(), "EmptyCommand");
        assert_eq!(ProtocolError::MissingBrand.to_string(), "MissingBrand");
        assert_eq!(ProtocolError::InternalError.to_string(), "InternalError");
        assert_eq!(
            ProtocolError::UnknownCommand("FOO bar".to_string()).to_string(),
            "UnknownCommand: FOO bar"
        );
    }

    #[test]
    fn test_disconnect_classification() {
        let reset = TransportError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());

        let other = TransportError::from(io::Error::from(io::ErrorKind::InvalidData));
        assert!(!other.is_disconnect());

        assert!(!TransportError::Cancelled.is_disconnect());
    }
}
