//! Admission checks: who may connect, and who may authenticate.
//!
//! Two gates stand between a TCP socket and a session:
//!
//! 1. [`AddressPolicy`] — checked as soon as the WebSocket opens. At most
//!    one source address is allowed; everything else is turned away.
//! 2. [`Authenticator`] — checked when the peer sends its `authenticate`
//!    frame. The bridge ships [`SharedSecretAuthenticator`], which compares
//!    the password verbatim against the configured secret.
//!
//! # Why a trait?
//!
//! Tests and embedders can swap in their own rule (an always-accept
//! authenticator for local development, a rotating secret, ...) without
//! touching the listener.

use std::future::Future;
use std::net::IpAddr;

use bridgeward_protocol::Authenticate;

use crate::SessionError;

/// Validates a peer's `authenticate` payload.
///
/// # Trait bounds
///
/// - `Send + Sync` → the authenticator is shared by every connection task.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use bridgeward_protocol::Authenticate;
/// use bridgeward_session::{Authenticator, SessionError};
///
/// /// Lets anyone in. Only for local development.
/// struct OpenDoor;
///
/// impl Authenticator for OpenDoor {
///     async fn authenticate(
///         &self,
///         _payload: &Authenticate,
///     ) -> Result<(), SessionError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns `Ok(())` to admit the peer.
    ///
    /// # Returns
    /// - `Ok(())` — credentials accepted
    /// - `Err(SessionError::AuthFailed)` — rejected; the listener closes
    ///   the connection with a policy-violation code
    fn authenticate(
        &self,
        payload: &Authenticate,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Compares the password against one configured shared secret.
#[derive(Clone)]
pub struct SharedSecretAuthenticator {
    secret: String,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for SharedSecretAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretAuthenticator").finish_non_exhaustive()
    }
}

impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(
        &self,
        payload: &Authenticate,
    ) -> Result<(), SessionError> {
        if payload.password == self.secret {
            Ok(())
        } else {
            Err(SessionError::AuthFailed(
                "Invalid credentials provided".into(),
            ))
        }
    }
}

/// The source-address allow-list. `None` admits every address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressPolicy {
    allowed: Option<IpAddr>,
}

impl AddressPolicy {
    pub fn new(allowed: Option<IpAddr>) -> Self {
        Self { allowed }
    }

    pub fn allow_any() -> Self {
        Self { allowed: None }
    }

    /// # Errors
    /// Returns [`SessionError::AddressNotAllowed`] when an address is
    /// configured and `addr` isn't it.
    pub fn check(&self, addr: IpAddr) -> Result<(), SessionError> {
        match self.allowed {
            Some(allowed) if allowed != addr => {
                Err(SessionError::AddressNotAllowed(addr))
            }
            _ => Ok(()),
        }
    }
}
