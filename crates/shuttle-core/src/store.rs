//! Local checkpoint storage for in-progress inspections.
//!
//! One checkpoint per plate: the durable shadow of the active session. The
//! session machine writes it after every log mutation and deletes it when the
//! session ends or is cancelled. A checkpoint that cannot be deleted is left
//! behind marked closed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::clock::CivilTime;
use crate::types::{PassengerType, Plate, Route, ScanLogEntry};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during checkpoint store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Data Models
// ============================================================================

/// Snapshot of an active session.
///
/// Carries the route and the fare-rate table next to the log so a restored
/// session computes the same fares without going back to the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub plate: Plate,
    pub driver: String,
    pub route: Route,
    pub rates: Vec<PassengerType>,
    pub start_time: CivilTime,
    pub log: Vec<ScanLogEntry>,
    /// Set when the session finished but the checkpoint could not be deleted.
    /// A closed checkpoint is never rehydrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<Closure>,
}

/// How a session left Active while its checkpoint was still on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Closure {
    Submitted { inspection_id: String },
    Cancelled,
}

impl Checkpoint {
    /// True for a tombstone left behind by a finished session.
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Key-value persistence of checkpoints, keyed by plate.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `plate`, if one exists.
    async fn load(&self, plate: &Plate) -> Result<Option<Checkpoint>, StoreError>;

    /// Insert or replace the checkpoint for `checkpoint.plate`.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Remove the checkpoint for `plate`. Succeeds if none exists.
    async fn delete(&self, plate: &Plate) -> Result<(), StoreError>;

    /// Plates that currently have a checkpoint, sorted.
    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self, plate: &Plate) -> Result<Option<Checkpoint>, StoreError> {
        (**self).load(plate).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        (**self).save(checkpoint).await
    }

    async fn delete(&self, plate: &Plate) -> Result<(), StoreError> {
        (**self).delete(plate).await
    }

    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError> {
        (**self).list_plates().await
    }
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Thread-safe in-memory checkpoint store.
///
/// Cloning shares the underlying map, so a clone handed to a second machine
/// sees what the first one wrote. Tests use this to simulate a process kill.
#[derive(Default, Clone)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<Plate, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, plate: &Plate) -> Result<Option<Checkpoint>, StoreError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(plate).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.plate.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, plate: &Plate) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(plate);
        Ok(())
    }

    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError> {
        let checkpoints = self.checkpoints.read().await;
        let mut plates: Vec<Plate> = checkpoints.keys().cloned().collect();
        plates.sort();
        Ok(plates)
    }
}
