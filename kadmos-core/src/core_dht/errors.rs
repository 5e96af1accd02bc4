/*
    errors.rs - Error types for the DHT storage subsystem

    Structural errors (bad registry arguments, undecodable values) fail fast
    to the caller. Network errors only ever reach the background publisher,
    which logs them and retries on its next tick.
*/

use thiserror::Error;

/// Errors that can occur in the DHT storage subsystem
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DhtError {
    /// A registry or constructor was called with an invalid argument
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A value could not be constructed from its bytes
    #[error("Decode error: {0}")]
    Decode(String),

    /// A value could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// A lock was poisoned by a panicking holder
    #[error("Lock error: {0}")]
    Lock(String),

    /// A network store did not complete
    #[error("Store failed: {0}")]
    Store(String),

    /// The operation was cancelled before completing
    #[error("Operation cancelled")]
    Cancelled,

    /// The node has not joined the overlay yet
    #[error("Node is not bootstrapped")]
    NotBootstrapped,
}

/// Result type for DHT storage operations
pub type DhtResult<T> = Result<T, DhtError>;

impl DhtError {
    pub(crate) fn lock<E: std::fmt::Display>(what: &str, err: E) -> Self {
        DhtError::Lock(format!("{}: {}", what, err))
    }
}
