//! Engine state persistence
//!
//! Snapshots are written as JSON to a temporary file next to the target and
//! renamed over it, so a crash never leaves a truncated snapshot behind.

use crate::position::{PerformanceStats, Position};
use crate::risk::PortfolioState;
use crate::strategy::StrategyState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Restart state for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub portfolio: PortfolioState,
    pub strategies: Vec<StrategyState>,
    /// Non-terminal positions at save time, re-verified against the exchange on restore
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub performance: PerformanceStats,
    pub saved_at: DateTime<Utc>,
}

/// JSON file store for engine snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot atomically
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "Snapshot saved");
        Ok(())
    }

    /// Read the last snapshot, if one exists
    pub async fn load(&self) -> Result<Option<EngineSnapshot>, SnapshotError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
