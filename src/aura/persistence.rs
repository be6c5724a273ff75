use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::aura::classifier::AdaptiveThresholds;
use crate::aura::context::LearnedPatterns;
use crate::aura::types::{ContextSnapshot, StateTransition};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage exhausted: {0}")]
    Exhausted(String),
}

/// Append-only sink for snapshots, transitions and learned state. Reads back
/// ranges for analytics and for seeding the engine at startup.
#[async_trait]
pub trait AuraStore: Send + Sync {
    async fn append_snapshot(&self, snapshot: &ContextSnapshot) -> Result<(), StorageError>;
    async fn append_transition(&self, transition: &StateTransition) -> Result<(), StorageError>;
    async fn save_patterns(&self, patterns: &LearnedPatterns) -> Result<(), StorageError>;
    async fn load_patterns(&self) -> Result<Option<LearnedPatterns>, StorageError>;
    async fn save_thresholds(&self, thresholds: &AdaptiveThresholds) -> Result<(), StorageError>;
    async fn load_thresholds(&self) -> Result<Option<AdaptiveThresholds>, StorageError>;
    async fn snapshots_since(&self, since: DateTime<Utc>) -> Result<Vec<ContextSnapshot>, StorageError>;
    async fn transitions_since(&self, since: DateTime<Utc>) -> Result<Vec<StateTransition>, StorageError>;
    /// Deletes snapshots older than `older_than`, then the oldest until at
    /// most `max_entries` remain. Returns how many were removed.
    async fn prune_snapshots(&self, older_than: DateTime<Utc>, max_entries: usize) -> Result<usize, StorageError>;
}

#[derive(Default)]
struct MemoryTables {
    snapshots: Vec<ContextSnapshot>,
    transitions: Vec<StateTransition>,
    patterns: Option<LearnedPatterns>,
    thresholds: Option<AdaptiveThresholds>,
}

/// Process-local store, used by the binary and by tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<MemoryTables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.tables.read().snapshots.len()
    }

    pub fn transition_count(&self) -> usize {
        self.tables.read().transitions.len()
    }
}

#[async_trait]
impl AuraStore for InMemoryStore {
    async fn append_snapshot(&self, snapshot: &ContextSnapshot) -> Result<(), StorageError> {
        self.tables.write().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn append_transition(&self, transition: &StateTransition) -> Result<(), StorageError> {
        self.tables.write().transitions.push(transition.clone());
        Ok(())
    }

    async fn save_patterns(&self, patterns: &LearnedPatterns) -> Result<(), StorageError> {
        self.tables.write().patterns = Some(patterns.clone());
        Ok(())
    }

    async fn load_patterns(&self) -> Result<Option<LearnedPatterns>, StorageError> {
        Ok(self.tables.read().patterns.clone())
    }

    async fn save_thresholds(&self, thresholds: &AdaptiveThresholds) -> Result<(), StorageError> {
        self.tables.write().thresholds = Some(thresholds.clone());
        Ok(())
    }

    async fn load_thresholds(&self) -> Result<Option<AdaptiveThresholds>, StorageError> {
        Ok(self.tables.read().thresholds.clone())
    }

    async fn snapshots_since(&self, since: DateTime<Utc>) -> Result<Vec<ContextSnapshot>, StorageError> {
        Ok(self
            .tables
            .read()
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn transitions_since(&self, since: DateTime<Utc>) -> Result<Vec<StateTransition>, StorageError> {
        Ok(self
            .tables
            .read()
            .transitions
            .iter()
            .filter(|t| t.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn prune_snapshots(&self, older_than: DateTime<Utc>, max_entries: usize) -> Result<usize, StorageError> {
        let mut tables = self.tables.write();
        let before = tables.snapshots.len();
        tables.snapshots.retain(|s| s.timestamp >= older_than);
        if tables.snapshots.len() > max_entries {
            tables.snapshots.sort_by_key(|s| s.timestamp);
            let excess = tables.snapshots.len() - max_entries;
            tables.snapshots.drain(..excess);
        }
        Ok(before - tables.snapshots.len())
    }
}
