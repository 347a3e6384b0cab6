// src/core/coordination/lock.rs

//! Mutual-exclusion lock over ephemeral sequential children.

use super::{CoordinationClient, SessionState, sequence_of};
use crate::core::errors::OtterError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How often a pending acquirer re-checks the children list.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A cluster-wide lock under a known path. The lock is held iff this
/// instance's ephemeral child carries the lowest sequence number; loss of
/// the session implicitly releases it.
pub struct DistributedLock {
    client: Arc<dyn CoordinationClient>,
    path: String,
    prefix: String,
    node: Mutex<Option<String>>,
}

impl DistributedLock {
    pub fn new(client: Arc<dyn CoordinationClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            prefix: format!("{}__lock__", uuid::Uuid::new_v4()),
            node: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Acquires the lock, waiting up to `timeout` for earlier contenders to
    /// go away. On timeout the pending child is removed and `LockTimeout`
    /// is returned, so an abandoned acquisition never blocks others.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), OtterError> {
        self.ensure_registered().await?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_held().await? {
                debug!(path = %self.path, "lock acquired");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                self.release().await?;
                return Err(OtterError::LockTimeout(self.path.clone()));
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Whether this instance currently holds the lock. Checked against the
    /// live children list on every call (O(children)), because the session
    /// may have silently dropped our node since the last answer.
    pub async fn is_held(&self) -> Result<bool, OtterError> {
        if self.client.session_state() != SessionState::Connected {
            return Ok(false);
        }
        let own = match self.node.lock().clone() {
            Some(name) => name,
            None => return Ok(false),
        };
        let mut children = self.client.get_children(&self.path).await?;
        if children.is_empty() {
            return Ok(false);
        }
        children.sort_by_key(|c| sequence_of(c));
        Ok(children[0] == own)
    }

    /// Releases the lock by deleting this instance's child, if any.
    pub async fn release(&self) -> Result<(), OtterError> {
        let own = self.node.lock().take();
        if let Some(name) = own {
            self.client.delete(&format!("{}/{}", self.path, name)).await?;
        }
        Ok(())
    }

    async fn ensure_registered(&self) -> Result<(), OtterError> {
        let registered = self.node.lock().is_some();
        if !registered {
            let name = self
                .client
                .create_ephemeral_sequential(&format!("{}/{}", self.path, self.prefix))
                .await?;
            *self.node.lock() = Some(name);
        }
        Ok(())
    }
}
