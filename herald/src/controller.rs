use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use herald_common::{
    ConfidentialMessage, DeliveryStatus, NetworkId, NetworkIdWithKeyPair, Signal, internal,
};
use herald_ledger::{LedgerConfig, MessageId, RetryLedger, RetryRecord};
use herald_resend::{
    DeliveryStatusSource, ResendConfig, ResendService, SendGateway, TransportAvailability,
};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

/// Root of `herald.config.ron`
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Herald {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub resend: ResendConfig,
}

impl Herald {
    /// Parse a RON configuration
    ///
    /// # Errors
    /// If `content` is not a valid configuration
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Read and parse the configuration at `path`
    ///
    /// # Errors
    /// If the file cannot be read or is not a valid configuration
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Self::from_ron(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    /// Load the retry ledger and start a resend service on top of it
    ///
    /// # Errors
    /// - If the ledger location is invalid or cannot be prepared
    /// - If the persisted ledger cannot be read
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn build(
        &self,
        gateway: Arc<dyn SendGateway>,
        statuses: Arc<dyn DeliveryStatusSource>,
        transports: Arc<dyn TransportAvailability>,
    ) -> anyhow::Result<ResendService> {
        let store = self.ledger.clone().into_backing_store()?;
        let ledger = RetryLedger::load(store).await?;

        let service = ResendService::new(
            self.resend.clone(),
            Arc::new(ledger),
            gateway,
            statuses,
            transports,
        );
        service.initialize()?;

        internal!(level = INFO, "Resend service running");
        Ok(service)
    }

    /// Wait for a shutdown signal, then stop `service` and flush its ledger
    ///
    /// # Errors
    /// If the final ledger write fails
    pub async fn serve(
        service: &ResendService,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        loop {
            match shutdown.recv().await {
                Ok(Signal::Shutdown | Signal::Finalised) | Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }

        internal!("Resend service received shutdown signal");
        service.shutdown();
        service.ledger().persist().await?;
        internal!(level = INFO, "Resend service shutdown complete");

        Ok(())
    }

    /// A fresh record for a message that has just been handed to the network
    pub fn record(
        &self,
        id: MessageId,
        payload: ConfidentialMessage,
        sender: NetworkIdWithKeyPair,
        receiver: NetworkId,
        status: DeliveryStatus,
    ) -> RetryRecord {
        RetryRecord::new(
            id,
            payload,
            sender,
            receiver,
            status,
            self.ledger.record_ttl(),
        )
    }
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
///
/// # Errors
/// If `HERALD_CONFIG` names a missing file, or no default location exists
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    find_config_file_from(std::env::var(CONFIG_ENV).ok())
}

fn find_config_file_from(env_path: Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
