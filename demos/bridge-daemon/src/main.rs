//! A runnable bridge.
//!
//! ```text
//! bridge-daemon [config.toml]
//! ```
//!
//! Reads the config (default `bridgeward.toml`), starts the listener, and
//! re-arms any persisted punishments. The chat platform here is a stand-in
//! that only logs what it would do.
//!
//! ```toml
//! log_filter = "info,bridgeward=debug"
//! sync_commands = ["kick", "ban", "unban", "timeout", "untimeout"]
//!
//! [bridge]
//! host = "0.0.0.0"
//! port = 8765
//! password = "change-me"
//!
//! [[links]]
//! user_id = 1234
//! username = "Steve"
//! uuid = "069a79f4-44e9-4726-a5be-fca90e38aaf5"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridgeward::prelude::*;
use bridgeward::scheduler::ModerationError;
use serde::Deserialize;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DaemonConfig {
    log_filter: Option<String>,
    sync_commands: Vec<String>,
    bridge: BridgeConfig,
    links: Vec<Link>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            sync_commands: CommandSyncPolicy::COMMANDS.map(String::from).to_vec(),
            bridge: BridgeConfig::default(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    user_id: u64,
    username: String,
    uuid: String,
}

fn load(path: &PathBuf) -> Result<DaemonConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(toml::from_str(&text)?)
}

// ---------------------------------------------------------------------------
// Chat platform stand-in
// ---------------------------------------------------------------------------

struct LoggingModeration;

#[async_trait]
impl ModerationBackend for LoggingModeration {
    async fn timeout(
        &self,
        user: UserId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        info!(%user, secs = duration.as_secs(), ?reason, "timeout");
        Ok(())
    }

    async fn clear_timeout(&self, user: UserId) -> Result<(), ModerationError> {
        info!(%user, "clear timeout");
        Ok(())
    }

    async fn ban(&self, user: UserId, reason: Option<&str>) -> Result<(), ModerationError> {
        info!(%user, ?reason, "ban");
        Ok(())
    }

    async fn unban(&self, user: UserId) -> Result<(), ModerationError> {
        info!(%user, "unban");
        Ok(())
    }

    async fn kick(&self, user: UserId, reason: Option<&str>) -> Result<(), ModerationError> {
        info!(%user, ?reason, "kick");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "bridgeward.toml".into()),
    );
    let config = load(&path)?;
    bridgeward::logging::init(config.log_filter.as_deref())?;

    if !config.bridge.is_enabled() {
        warn!("no host configured; server disabled");
        return Ok(());
    }

    let links = config
        .links
        .iter()
        .fold(StaticAccountLinks::new(), |links, link| {
            links.link(UserId::new(link.user_id), &link.username, &link.uuid)
        });
    let scheduler = PunishmentScheduler::new(
        Arc::new(InMemoryPunishmentStore::new()),
        Arc::new(LoggingModeration),
    );
    let sync = Arc::new(PunishmentSync::new(
        scheduler.clone(),
        CommandSyncPolicy::new(config.sync_commands),
        Arc::new(links),
    ));

    match scheduler.recover().await {
        Ok(report) => info!(
            expired = report.expired,
            rearmed = report.rearmed,
            failed = report.failed,
            "punishments recovered"
        ),
        Err(e) => error!(error = %e, "punishment recovery failed"),
    }

    let auth = SharedSecretAuthenticator::new(config.bridge.password.clone());
    let server = BridgeServerBuilder::new()
        .config(config.bridge)
        .punishment_sync(sync)
        .build(auth)
        .await?;
    info!(addr = ?server.local_addr().ok(), "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    scheduler.shutdown();
    info!("stopped");
    Ok(())
}
