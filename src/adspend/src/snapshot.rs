//! JSON file standing in for the report database between CLI invocations.

use std::path::Path;

use adspend_core::Report;
use adspend_sync::{InMemoryCampaignRepository, SyncEngine, SyncHistoryEntry};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub reports: Vec<Report>,
    /// Newest first. Kept for display only.
    #[serde(default)]
    pub history: Vec<SyncHistoryEntry>,
}

impl StoreSnapshot {
    /// A missing file is an empty store.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "no snapshot yet, starting empty");
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub async fn save(
        path: &Path,
        repository: &InMemoryCampaignRepository,
        engine: &SyncEngine,
    ) -> anyhow::Result<()> {
        let snapshot = Self {
            reports: repository.snapshot(),
            history: engine.history().recent(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            path = %path.display(),
            reports = snapshot.reports.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Replay saved history into `engine`, oldest first.
    pub fn restore_history(history: Vec<SyncHistoryEntry>, engine: &SyncEngine) {
        for entry in history.into_iter().rev() {
            engine.history().record(entry);
        }
    }
}
