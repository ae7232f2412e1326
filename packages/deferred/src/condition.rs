use std::error::Error;

use thiserror::Error;

/// A ready-made event payload for arenas that do not bring their own error type.
///
/// [`Arena`][crate::Arena] is generic over its event type, so any type can be signaled. This
/// type covers the common case where the event loop reports failures either as a message or
/// as an existing error value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Condition {
    /// An operation failed and described the failure with a message.
    #[error("{message}")]
    Failure {
        /// A human-readable description of the failure.
        message: String,
    },

    /// An operation failed with an error produced elsewhere.
    #[error(transparent)]
    Other(#[from] Box<dyn Error + Send + Sync>),
}

impl Condition {
    /// Creates a [`Condition::Failure`] with the given message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// The failure message, if this is a [`Condition::Failure`].
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message),
            Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;
    use std::io;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Condition: Send, Sync, Debug);

    #[test]
    fn failure_carries_message() {
        let condition = Condition::failure("connection reset");

        assert_eq!(condition.message(), Some("connection reset"));
        assert_eq!(condition.to_string(), "connection reset");
    }

    #[test]
    fn other_wraps_existing_error() {
        let source: Box<dyn Error + Send + Sync> =
            Box::new(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        let condition = Condition::from(source);

        assert!(matches!(condition, Condition::Other(_)));
        assert_eq!(condition.message(), None);
        assert_eq!(condition.to_string(), "pipe closed");
    }
}
