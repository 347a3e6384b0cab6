// src/core/coordination/partitioner.rs

//! Partitions a finite bucket set across the live members of the cluster.

use super::{CoordinationClient, SessionState, sequence_of};
use crate::core::errors::OtterError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Allocation state machine. Consumers poll `state()` each tick and only act
/// on `Acquired`; a membership change forces a pass through `Release` before
/// buckets are handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionerState {
    Allocating,
    Acquired,
    Release,
}

struct Inner {
    state: PartitionerState,
    own_node: Option<String>,
    members: Vec<String>,
    assigned: Vec<u32>,
}

/// Assigns a subset of `buckets` to this node, by dealing the sorted bucket
/// list round-robin over the sorted member list.
pub struct Partitioner {
    client: Arc<dyn CoordinationClient>,
    path: String,
    buckets: Vec<u32>,
    inner: Mutex<Inner>,
}

impl Partitioner {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        path: impl Into<String>,
        buckets: Vec<u32>,
    ) -> Self {
        Self {
            client,
            path: path.into(),
            buckets,
            inner: Mutex::new(Inner {
                state: PartitionerState::Allocating,
                own_node: None,
                members: Vec::new(),
                assigned: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> PartitionerState {
        self.inner.lock().state
    }

    /// The buckets owned by this node. Empty unless `Acquired`.
    pub fn current_buckets(&self) -> Vec<u32> {
        let inner = self.inner.lock();
        match inner.state {
            PartitionerState::Acquired => inner.assigned.clone(),
            _ => Vec::new(),
        }
    }

    /// Drives one step of the state machine: register membership, observe
    /// the member list, and transition. Called once per scheduler tick.
    pub async fn tick(&self) -> Result<(), OtterError> {
        if self.client.session_state() == SessionState::Lost {
            let mut inner = self.inner.lock();
            inner.state = PartitionerState::Allocating;
            inner.own_node = None;
            inner.assigned.clear();
            inner.members.clear();
            return Err(OtterError::SessionLost);
        }

        self.ensure_registered().await?;
        let mut members = self.client.get_children(&self.path).await?;
        members.sort_by_key(|c| sequence_of(c));

        let mut inner = self.inner.lock();
        if members != inner.members {
            debug!(path = %self.path, members = members.len(), "membership changed");
            inner.members = members;
            if inner.state == PartitionerState::Acquired {
                inner.state = PartitionerState::Release;
                return Ok(());
            }
        }

        match inner.state {
            PartitionerState::Release => {
                // Honor the release before any reallocation happens.
                inner.assigned.clear();
                inner.state = PartitionerState::Allocating;
            }
            PartitionerState::Allocating => {
                let own = inner.own_node.clone().unwrap_or_default();
                let position = inner.members.iter().position(|m| *m == own);
                if let Some(index) = position {
                    let count = inner.members.len();
                    inner.assigned = self
                        .buckets
                        .iter()
                        .copied()
                        .enumerate()
                        .filter(|(i, _)| i % count == index)
                        .map(|(_, b)| b)
                        .collect();
                    inner.state = PartitionerState::Acquired;
                    info!(
                        path = %self.path,
                        buckets = ?inner.assigned,
                        "partition acquired"
                    );
                }
            }
            PartitionerState::Acquired => {}
        }
        Ok(())
    }

    async fn ensure_registered(&self) -> Result<(), OtterError> {
        let registered = self.inner.lock().own_node.is_some();
        if !registered {
            let name = self
                .client
                .create_ephemeral_sequential(&format!("{}/member__", self.path))
                .await?;
            self.inner.lock().own_node = Some(name);
        }
        Ok(())
    }
}
