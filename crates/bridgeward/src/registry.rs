//! The action registry: which handler runs for which inbound action.
//!
//! Built once at startup with explicit [`register`](ActionRegistry::register)
//! calls (see [`default_registry`](crate::default_registry)), then shared
//! read-only by every connection.
//!
//! # Dependencies
//!
//! A handler receives its validated payload plus a [`HandlerContext`]. It
//! declares up front which [`Dependency`] values it needs. Before each
//! call the listener asks its [`Providers`] table to fill exactly those
//! into the context; a dependency without a provider fails the dispatch
//! with [`BridgeError::MissingDependency`] instead of the handler running
//! half-equipped.
//!
//! | Dependency | Provided value |
//! |------------|----------------|
//! | `Connection` | the connection the frame arrived on |
//! | `Bridge` | the shared [`BridgeState`] |
//! | `Sync` | the [`PunishmentSync`], when one is configured |

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bridgeward_protocol::{ActionSchema, ProtocolError, ServerLookup};
use bridgeward_transport::WebSocketConnection;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::{BridgeError, BridgeState, PunishmentSync};

/// A value a handler can ask to have injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Connection,
    Bridge,
    Sync,
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Bridge => "bridge",
            Self::Sync => "sync",
        }
    }
}

// ---------------------------------------------------------------------------
// Providers and context
// ---------------------------------------------------------------------------

/// The values available for injection on one connection.
#[derive(Clone, Default)]
pub struct Providers {
    pub connection: Option<Arc<WebSocketConnection>>,
    pub bridge: Option<Arc<BridgeState>>,
    pub sync: Option<Arc<PunishmentSync>>,
}

impl Providers {
    /// Builds a context holding exactly `dependencies`.
    ///
    /// # Errors
    /// [`BridgeError::MissingDependency`] for the first one without a
    /// provider.
    pub fn resolve(&self, dependencies: &[Dependency]) -> Result<HandlerContext, BridgeError> {
        let mut ctx = HandlerContext::default();
        for dep in dependencies {
            let missing = || BridgeError::MissingDependency(dep.name());
            match dep {
                Dependency::Connection => {
                    ctx.connection = Some(self.connection.clone().ok_or_else(missing)?);
                }
                Dependency::Bridge => {
                    ctx.bridge = Some(self.bridge.clone().ok_or_else(missing)?);
                }
                Dependency::Sync => {
                    ctx.sync = Some(self.sync.clone().ok_or_else(missing)?);
                }
            }
        }
        Ok(ctx)
    }
}

/// What a handler gets besides its payload.
#[derive(Clone, Default)]
pub struct HandlerContext {
    connection: Option<Arc<WebSocketConnection>>,
    bridge: Option<Arc<BridgeState>>,
    sync: Option<Arc<PunishmentSync>>,
}

impl HandlerContext {
    pub fn connection(&self) -> Result<&Arc<WebSocketConnection>, BridgeError> {
        self.connection
            .as_ref()
            .ok_or(BridgeError::MissingDependency(Dependency::Connection.name()))
    }

    pub fn bridge(&self) -> Result<&Arc<BridgeState>, BridgeError> {
        self.bridge
            .as_ref()
            .ok_or(BridgeError::MissingDependency(Dependency::Bridge.name()))
    }

    pub fn sync(&self) -> Result<&Arc<PunishmentSync>, BridgeError> {
        self.sync
            .as_ref()
            .ok_or(BridgeError::MissingDependency(Dependency::Sync.name()))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A handler call, ready to be awaited.
pub type HandlerFuture = BoxFuture<'static, Result<(), BridgeError>>;

type ErasedHandler = Arc<
    dyn Fn(HandlerContext, Map<String, Value>, &dyn ServerLookup) -> Result<HandlerFuture, ProtocolError>
        + Send
        + Sync,
>;

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredAction {
    action: &'static str,
    schema: &'static str,
    dependencies: Vec<Dependency>,
    handler: ErasedHandler,
}

impl RegisteredAction {
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// The payload type's name, for logs.
    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Decodes and validates the payload fields, then starts the handler.
    ///
    /// # Errors
    /// The payload's [`ProtocolError`]; the handler is not called.
    pub fn prepare(
        &self,
        ctx: HandlerContext,
        fields: Map<String, Value>,
        servers: &dyn ServerLookup,
    ) -> Result<HandlerFuture, ProtocolError> {
        (self.handler)(ctx, fields, servers)
    }
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("action", &self.action)
            .field("schema", &self.schema)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Maps action names to handlers.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `S::ACTION`.
    ///
    /// Registering the same action twice replaces the first handler and
    /// logs a warning.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bridgeward::{ActionRegistry, BridgeError, Dependency, HandlerContext};
    /// use bridgeward::protocol::PlayerStatusCheck;
    ///
    /// async fn on_status(ctx: HandlerContext, p: PlayerStatusCheck) -> Result<(), BridgeError> {
    ///     let bridge = ctx.bridge()?;
    ///     bridge.players().record_status(p.username.as_deref(), p.uuid.as_deref(), p.online);
    ///     Ok(())
    /// }
    ///
    /// let mut registry = ActionRegistry::new();
    /// registry.register::<PlayerStatusCheck, _, _>(&[Dependency::Bridge], on_status);
    /// assert!(registry.lookup("player-status-check").is_some());
    /// ```
    pub fn register<S, F, Fut>(&mut self, dependencies: &[Dependency], handler: F) -> &mut Self
    where
        S: ActionSchema,
        F: Fn(HandlerContext, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        let erased: ErasedHandler = Arc::new(
            move |ctx: HandlerContext, fields: Map<String, Value>, servers: &dyn ServerLookup| {
                let payload = S::from_fields(fields, servers)?;
                Ok(Box::pin(handler(ctx, payload)) as HandlerFuture)
            },
        );

        let entry = RegisteredAction {
            action: S::ACTION,
            schema: std::any::type_name::<S>(),
            dependencies: dependencies.to_vec(),
            handler: erased,
        };
        if self.actions.insert(S::ACTION, entry).is_some() {
            tracing::warn!(action = S::ACTION, "action handler replaced");
        } else {
            tracing::debug!(action = S::ACTION, "action handler registered");
        }
        self
    }

    pub fn lookup(&self, action: &str) -> Option<&RegisteredAction> {
        self.actions.get(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}
