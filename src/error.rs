//! Unified error type.

use std::borrow::Cow;
use std::io;

use thiserror::Error;

use crate::connection::ConnectionKind;

/// The error type returned by conntap's fallible operations.
///
/// Decorators never invent failures of their own: an `Io` error coming out of
/// an observed transport is the inner transport's error, untouched, and a
/// stage error is whatever the downstream stage returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure: I/O error, reset, or a side used after close.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Cancellation was requested through a [`CancellationToken`](crate::CancellationToken).
    ///
    /// A control signal rather than a failure; kept distinct so callers can
    /// tell it apart from both success and transport errors.
    #[error("operation cancelled")]
    Cancelled,

    /// The connection was aborted.
    #[error(transparent)]
    Aborted(#[from] ConnectionAborted),

    /// A stage was handed a connection kind it has no downstream handler for.
    ///
    /// This is a wiring bug, not a runtime condition; nothing is retried.
    #[error("no downstream handler configured for {0} connections")]
    MissingHandler(ConnectionKind),

    /// A downstream stage failed with its own error type.
    #[error("stage: {0}")]
    Stage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary downstream error.
    pub fn stage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Stage(err.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

const DEFAULT_ABORT_MESSAGE: &str = "the connection was aborted by the application";

/// The reason a connection was aborted.
///
/// `Default` carries the message connections use when `abort()` is called
/// without an explicit reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectionAborted {
    message: Cow<'static, str>,
}

impl ConnectionAborted {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for ConnectionAborted {
    fn default() -> Self {
        Self::new(DEFAULT_ABORT_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_kind_and_message() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset").into();
        match &err {
            Error::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(inner.to_string(), "peer reset");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.to_string(), "io: peer reset");
    }

    #[test]
    fn default_abort_reason_is_stable() {
        assert_eq!(ConnectionAborted::default(), ConnectionAborted::default());
        assert_eq!(ConnectionAborted::default().message(), DEFAULT_ABORT_MESSAGE);
        assert_eq!(ConnectionAborted::new("bye").to_string(), "bye");
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::stage("boom").is_cancelled());
        assert_eq!(Error::stage("boom").to_string(), "stage: boom");
    }
}
