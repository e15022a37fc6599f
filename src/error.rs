use std::sync::Arc;

use thiserror::Error;

/// Out-of-band error reporting for failures after a component became ready.
pub type ErrorCallback = Arc<dyn Fn(ServiceError) + Send + Sync>;

/// Failure taxonomy for the live session core.
///
/// Variants carry plain strings so errors can be cloned into the out-of-band
/// error callback after the originating call has already returned.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// An audio device could not be acquired. Fatal to session startup;
    /// anything partially acquired has already been released.
    #[error("audio acquisition failed: {reason}")]
    Acquisition { reason: String },

    /// A streaming service connection failed or dropped.
    #[error("{service} connection failed: {reason}")]
    Connection {
        service: &'static str,
        reason: String,
    },

    /// A summarizer response did not match the expected structure.
    #[error("summary validation failed: {reason}")]
    Validation { reason: String },
}

impl ServiceError {
    pub fn acquisition(reason: impl Into<String>) -> Self {
        Self::Acquisition {
            reason: reason.into(),
        }
    }

    pub fn connection(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Connection {
            service,
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
