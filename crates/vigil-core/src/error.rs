//! Error types for the Vigil platform

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VigilError>;

#[derive(Error, Debug)]
pub enum VigilError {
    /// No handler for the resolved kind, or its payload failed to decode or validate.
    #[error("Dispatch failed for kind {kind}: {reason}")]
    Dispatch { kind: String, reason: String },

    /// Missing row, or a conditional transition whose precondition did not hold.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {reason}")]
    BadInput { reason: String },

    #[error("Store operation failed: {reason}")]
    Store { reason: String },

    /// An alert could not be handed to its sink.
    #[error("Alert delivery failed: {reason}")]
    Delivery { reason: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl VigilError {
    pub fn dispatch(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn bad_input(reason: impl Into<String>) -> Self {
        Self::BadInput {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn delivery(reason: impl Into<String>) -> Self {
        Self::Delivery {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. })
    }

    /// Store and delivery failures are transient from the caller's point of
    /// view; everything else will fail the same way on a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Delivery { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for VigilError {
    fn from(err: sqlx::Error) -> Self {
        Self::store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(VigilError::store("connection reset").is_retryable());
        assert!(VigilError::delivery("webhook returned 502").is_retryable());
        assert!(!VigilError::dispatch("PING", "bad payload").is_retryable());
        assert!(!VigilError::not_found("queue item", "x").is_retryable());
        assert!(!VigilError::bad_input("missing agent").is_retryable());
    }

    #[test]
    fn messages_carry_identifiers() {
        let err = VigilError::not_found("queue item", "abc-123");
        assert_eq!(err.to_string(), "queue item not found: abc-123");
        assert!(err.is_not_found());

        let err = VigilError::dispatch("TRACE", "no handler registered");
        assert!(err.to_string().contains("TRACE"));
        assert!(err.is_dispatch());
    }
}
