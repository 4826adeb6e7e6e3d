use thiserror::Error;

/// Protocol-wide error types for the Mooring Protocol.
///
/// Every ledger operation is all-or-nothing: any of these errors means the
/// operation left no partial state behind.
#[derive(Debug, Error)]
pub enum MooringError {
    /// A caller-supplied argument failed validation (zero amount, bad
    /// unlock time, duplicate lock, and so on).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not valid in the ledger's current state
    /// (expired lock, missing lock, conversion window closed).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller lacks the required capability.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The external token ledger refused a transfer.
    #[error("Token error: {0}")]
    Token(String),

    /// Deferred settlement has not completed yet (delegate withdrawal
    /// before full injection). Retryable once settled.
    #[error("Settlement pending: {0}")]
    SettlementPending(String),

    /// An internal invariant was violated. Indicates an implementation
    /// defect, not a caller mistake.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MooringError {
    fn from(e: serde_json::Error) -> Self {
        MooringError::Serialization(e.to_string())
    }
}
