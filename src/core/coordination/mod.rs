// src/core/coordination/mod.rs

//! Cluster-wide coordination built on a service supporting ephemeral
//! sequential children: a mutual-exclusion lock and a bucket partitioner.

mod lock;
mod memory;
mod partitioner;

pub use lock::DistributedLock;
pub use memory::InMemoryCoordination;
pub use partitioner::{Partitioner, PartitionerState};

use crate::core::errors::OtterError;
use async_trait::async_trait;

/// Length of the zero-padded sequence suffix appended to sequential nodes.
pub const SEQUENCE_LEN: usize = 10;

/// Connection state of the coordination session. Ephemeral nodes vanish when
/// the session is lost, which implicitly releases every lock it held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Suspended,
    Lost,
}

/// The minimal client surface the lock and partitioner need. The production
/// binding and the in-memory test double both implement it.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Creates an ephemeral sequential child. `prefix` is a full path ending
    /// in the caller's node prefix; the returned name is the child's name
    /// (prefix plus zero-padded sequence) relative to its parent.
    async fn create_ephemeral_sequential(&self, prefix: &str) -> Result<String, OtterError>;

    /// Child names (relative) under `path`, unordered.
    async fn get_children(&self, path: &str) -> Result<Vec<String>, OtterError>;

    /// Deletes the node at `path`. Deleting a missing node is not an error.
    async fn delete(&self, path: &str) -> Result<(), OtterError>;

    fn session_state(&self) -> SessionState;
}

/// Extracts the numeric sequence from a sequential child name, for ordering.
/// Names without a valid suffix order last.
pub(crate) fn sequence_of(child: &str) -> u64 {
    if child.len() < SEQUENCE_LEN {
        return u64::MAX;
    }
    child[child.len() - SEQUENCE_LEN..]
        .parse()
        .unwrap_or(u64::MAX)
}
