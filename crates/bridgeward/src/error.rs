//! Unified error type for Bridgeward.

use bridgeward_expiry::ExpiryError;
use bridgeward_protocol::ProtocolError;
use bridgeward_scheduler::SchedulerError;
use bridgeward_session::SessionError;
use bridgeward_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `bridgeward` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant auto-generates `From` impls, so the `?` operator
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A transport-level error (bind, handshake, send, recv, certificate).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, failed validation).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (bad password, address, duplicate session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The player projections couldn't be created.
    #[error(transparent)]
    Expiry(#[from] ExpiryError),

    /// A punishment couldn't be applied, persisted, or parsed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A handler declared a dependency nobody provides.
    #[error("no provider for handler dependency '{0}'")]
    MissingDependency(&'static str),
}
