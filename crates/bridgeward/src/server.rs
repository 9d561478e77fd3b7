//! `BridgeServer` builder and server loop.
//!
//! This is the entry point for running a bridge. It ties together all the
//! layers: transport → protocol → session → registry → handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bridgeward_session::{AddressPolicy, Authenticator};
use bridgeward_transport::{TlsMode, WebSocketTransport};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::actions::{default_registry, register_command_sync};
use crate::listener::handle_connection;
use crate::{
    AccountLinks, ActionRegistry, BridgeConfig, BridgeError, BridgeState, Outbound, Providers,
    PunishmentSync,
};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<A: Authenticator> {
    pub(crate) bridge: Arc<BridgeState>,
    pub(crate) registry: ActionRegistry,
    pub(crate) providers: Providers,
    pub(crate) policy: AddressPolicy,
    pub(crate) auth: A,
}

/// Builder for configuring and starting a bridge.
///
/// # Example
///
/// ```rust,ignore
/// use bridgeward::prelude::*;
///
/// let server = BridgeServerBuilder::new()
///     .config(config)
///     .build(SharedSecretAuthenticator::new("change-me"))
///     .await?;
/// let outbound = server.outbound();
/// server.run().await
/// ```
pub struct BridgeServerBuilder {
    config: BridgeConfig,
    bind_addr: Option<String>,
    tls: Option<TlsMode>,
    registry: Option<ActionRegistry>,
    sync: Option<Arc<PunishmentSync>>,
    links: Option<Arc<dyn AccountLinks>>,
}

impl BridgeServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            bind_addr: None,
            tls: None,
            registry: None,
            sync: None,
            links: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds to `addr` instead of the config's `host:port`.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = Some(addr.to_string());
        self
    }

    /// Overrides TLS. By default a self-signed certificate for the
    /// configured host is generated (or reused) in `cert_dir`.
    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Starts from this registry instead of [`default_registry`].
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Mirrors inbound `command-executed` events through `sync`, and uses
    /// its account links for [`PlayerRef::Account`](crate::PlayerRef::Account)
    /// unless [`account_links`](Self::account_links) says otherwise.
    pub fn punishment_sync(mut self, sync: Arc<PunishmentSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn account_links(mut self, links: Arc<dyn AccountLinks>) -> Self {
        self.links = Some(links);
        self
    }

    /// Binds the listener and builds the server with the given
    /// authenticator.
    ///
    /// # Errors
    /// - [`BridgeError::Config`]: invalid config, or no address to bind
    /// - [`BridgeError::Transport`]: bind or certificate failure
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<BridgeServer<A>, BridgeError> {
        self.config.validate()?;

        let addr = match self.bind_addr.or_else(|| self.config.bind_addr()) {
            Some(addr) => addr,
            None => return Err(BridgeError::Config("no host configured".into())),
        };
        let tls = match self.tls {
            Some(tls) => tls,
            None => {
                let host = self.config.host.as_deref().unwrap_or("localhost");
                TlsMode::self_signed(&self.config.cert_dir, host)?
            }
        };
        let transport = WebSocketTransport::bind(&addr, tls).await?;

        let mut registry = self.registry.unwrap_or_else(default_registry);
        if self.sync.is_some() && !registry.contains("command-executed") {
            register_command_sync(&mut registry);
        }

        let links = self
            .links
            .or_else(|| self.sync.as_ref().map(|sync| Arc::clone(sync.links())));
        let policy = AddressPolicy::new(self.config.allowed_ip);
        let bridge = Arc::new(BridgeState::new(self.config)?);
        let providers = Providers {
            connection: None,
            bridge: Some(Arc::clone(&bridge)),
            sync: self.sync,
        };

        let state = Arc::new(ServerState {
            bridge: Arc::clone(&bridge),
            registry,
            providers,
            policy,
            auth,
        });

        Ok(BridgeServer {
            transport,
            state,
            outbound: Outbound::new(bridge, links),
        })
    }
}

impl Default for BridgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound bridge.
///
/// Call [`run()`](Self::run) to start accepting connections. Grab an
/// [`Outbound`] handle first; it keeps working while the server runs.
pub struct BridgeServer<A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A>>,
    outbound: Outbound,
}

impl<A: Authenticator> BridgeServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for sending commands to the peer.
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    pub fn state(&self) -> Arc<BridgeState> {
        Arc::clone(&self.state.bridge)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BridgeError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Accepts incoming connections and spawns a task per connection that
    /// finishes the TLS and WebSocket handshakes and then runs the
    /// listener. The auth timeout starts at accept: a client still
    /// handshaking when it runs out is dropped without a close frame. On shutdown the listening socket is closed and the
    /// player caches stop; connections already open finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.local_addr().ok();
        info!(?addr, "bridge server running");
        tokio::pin!(shutdown);

        loop {
            let incoming = tokio::select! {
                _ = &mut shutdown => break,
                incoming = self.transport.accept() => incoming,
            };
            match incoming {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    let deadline = Instant::now() + state.bridge.config.auth_timeout;
                    tokio::spawn(async move {
                        let peer = incoming.peer_addr();
                        // Dropping the pending upgrade closes the socket.
                        match tokio::time::timeout_at(deadline, incoming.upgrade()).await {
                            Ok(Ok(conn)) => {
                                handle_connection(Arc::new(conn), state, deadline).await
                            }
                            Ok(Err(e)) => debug!(%peer, error = %e, "handshake failed"),
                            Err(_) => warn!(%peer, "handshake not finished before the auth deadline"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }

        info!("bridge server stopped");
        self.state.bridge.shutdown();
        Ok(())
    }
}
