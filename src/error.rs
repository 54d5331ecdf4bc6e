//! Error types for the pub/sub engine.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// `unsubscribe` was called with an identity not present in the registry
    /// (double-unsubscribe or an id that was never issued).
    #[error("There is no subscription of id \"{0}\"")]
    SubscriptionNotFound(SubscriptionId),

    /// The underlying transport rejected an operation. Never retried by the
    /// engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// A trigger name could not be compiled as a glob pattern.
    #[error("invalid trigger pattern: {0}")]
    InvalidPattern(#[from] globset::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
