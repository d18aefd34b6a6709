use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    /// The markup is not well-formed. Normalizing loose HTML is the caller's job,
    /// so nothing is recovered and no partial output is produced.
    #[error("malformed markup at byte {position}: {message}")]
    MalformedInput { position: u64, message: String },
    /// An event sequence handed to the engine directly does not nest.
    #[error("unbalanced events at event {event}: {message}")]
    UnbalancedEvents { event: usize, message: String },
    #[error("invalid filter policy: {0}")]
    Configuration(String),
}

impl FilterError {
    pub(crate) fn malformed(position: u64, message: impl Into<String>) -> Self {
        FilterError::MalformedInput {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn unbalanced(event: usize, message: impl Into<String>) -> Self {
        FilterError::UnbalancedEvents {
            event,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        FilterError::Configuration(message.into())
    }
}

pub type FilterResult<T> = Result<T, FilterError>;
