//! Error types for expiring containers.

/// Errors that can occur when constructing an expiring container.
#[derive(Debug, thiserror::Error)]
pub enum ExpiryError {
    /// The time-to-live must be strictly positive. A zero TTL would make
    /// every entry vanish the instant it is inserted.
    #[error("time-to-live must be positive, got {0:?}")]
    InvalidTtl(std::time::Duration),
}
