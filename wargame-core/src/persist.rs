//! Scenario persistence for save/load functionality.
//!
//! A save file is the whole ledger (every branch, not only the current path)
//! plus the roster and the current position, as pretty-printed JSON. Stored
//! digests are never trusted on load: every node is re-hashed.

use crate::hash::ContentHash;
use crate::ledger::{Ledger, LedgerError, LedgerNode};
use crate::state::PlayerRef;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupt ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Saved position {0} is not in the saved ledger")]
    UnknownCurrent(ContentHash),
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A saved scenario with everything needed to resume play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedScenario {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the save was created (RFC 3339).
    pub saved_at: String,

    pub scenario_id: Uuid,

    pub topic: String,

    pub players: Vec<PlayerRef>,

    /// Every ledger node, parents before children.
    pub nodes: Vec<LedgerNode>,

    /// The position play resumes from.
    pub current: ContentHash,

    /// Summary readable without loading the ledger.
    pub metadata: SaveMetadata,
}

/// Metadata about the save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub scenario_id: Uuid,

    pub topic: String,

    pub players: usize,

    /// Total nodes across all branches.
    pub nodes: usize,

    /// Rounds committed on the current path.
    pub round: usize,

    /// In-world time at the current position.
    pub current_date_time: NaiveDateTime,

    pub saved_at: String,
}

impl SavedScenario {
    /// Capture `ledger` with play positioned at `current`.
    pub fn capture(
        scenario_id: Uuid,
        topic: impl Into<String>,
        players: Vec<PlayerRef>,
        ledger: &Ledger,
        current: &LedgerNode,
    ) -> Self {
        let saved_at = chrono::Utc::now().to_rfc3339();
        let topic = topic.into();
        let nodes: Vec<LedgerNode> = ledger.nodes().map(|node| (*node).clone()).collect();
        let metadata = SaveMetadata {
            scenario_id,
            topic: topic.clone(),
            players: players.len(),
            nodes: nodes.len(),
            round: current.snapshot().round(),
            current_date_time: current.snapshot().current_date_time,
            saved_at: saved_at.clone(),
        };

        Self {
            version: SAVE_VERSION,
            saved_at,
            scenario_id,
            topic,
            players,
            nodes,
            current: current.hash(),
            metadata,
        }
    }

    /// Rebuild the ledger, re-verifying every node, and find the current node.
    pub fn restore(self) -> Result<RestoredScenario, PersistError> {
        let ledger = Ledger::from_nodes(self.nodes)?;
        let current = ledger
            .find_by_hash(&self.current)
            .ok_or(PersistError::UnknownCurrent(self.current))?;

        Ok(RestoredScenario {
            scenario_id: self.scenario_id,
            topic: self.topic,
            players: self.players,
            ledger,
            current,
        })
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        info!(path = %path.display(), nodes = self.nodes.len(), "scenario saved");
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;

        // Check the version before committing to the full layout
        #[derive(Deserialize)]
        struct Version {
            version: u32,
        }
        let Version { version } = serde_json::from_str(&content)?;
        check_version(version)?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Read a save file's metadata without rebuilding its ledger.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        // Parse just enough to get metadata
        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        check_version(partial.version)?;
        Ok(partial.metadata)
    }
}

fn check_version(found: u32) -> Result<(), PersistError> {
    if found != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found,
        });
    }
    Ok(())
}

/// A loaded, verified scenario ready to resume.
#[derive(Debug)]
pub struct RestoredScenario {
    pub scenario_id: Uuid,
    pub topic: String,
    pub players: Vec<PlayerRef>,
    pub ledger: Ledger,
    pub current: std::sync::Arc<LedgerNode>,
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

/// List readable save files in a directory, most recently saved first.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Ok(metadata) = SavedScenario::peek_metadata(&path).await {
                saves.push(SaveInfo { path, metadata });
            }
        }
    }

    saves.sort_by(|a, b| b.metadata.saved_at.cmp(&a.metadata.saved_at));
    Ok(saves)
}

/// Default save file name for a scenario.
pub fn default_save_path(base_dir: impl AsRef<Path>, topic: &str, scenario_id: Uuid) -> PathBuf {
    let sanitized = topic
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    let short_id: String = scenario_id.simple().to_string().chars().take(8).collect();
    base_dir
        .as_ref()
        .join(format!("{sanitized}_{short_id}.json"))
}
