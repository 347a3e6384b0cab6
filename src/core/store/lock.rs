// src/core/store/lock.rs

//! A lock recipe over claim rows: write a TTL'd claim, read claims back,
//! and the oldest claim wins. While held, the claim is re-inserted on a
//! heartbeat so the TTL never lapses under a healthy holder; a crashed
//! holder's claim simply expires.

use super::ScalingStore;
use crate::core::errors::OtterError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

/// Claim lifetime. Kept short so a dead holder blocks contenders only briefly.
const CLAIM_TTL: Duration = Duration::from_secs(3);
/// Heartbeat period for re-asserting a held claim.
const CLAIM_INTERVAL: Duration = Duration::from_secs(1);

/// A store-backed mutual-exclusion lock keyed by `lock_id`.
pub struct ClaimLock {
    store: Arc<dyn ScalingStore>,
    lock_id: String,
    claim_id: Uuid,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl ClaimLock {
    pub fn new(store: Arc<dyn ScalingStore>, lock_id: impl Into<String>) -> Self {
        Self {
            store,
            lock_id: lock_id.into(),
            claim_id: Uuid::new_v4(),
            heartbeat: Mutex::new(None),
        }
    }

    /// Attempts to take the lock. Fails fast with `BusyLock` when another
    /// claim is ahead; the caller retries at its next tick.
    pub async fn acquire(&self) -> Result<(), OtterError> {
        self.store
            .insert_claim(&self.lock_id, self.claim_id, CLAIM_TTL)
            .await?;
        let claims = self.store.read_claims(&self.lock_id).await?;
        if claims.first() != Some(&self.claim_id) {
            self.store
                .delete_claim(&self.lock_id, self.claim_id)
                .await?;
            return Err(OtterError::BusyLock(self.lock_id.clone()));
        }

        let store = self.store.clone();
        let lock_id = self.lock_id.clone();
        let claim_id = self.claim_id;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLAIM_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.insert_claim(&lock_id, claim_id, CLAIM_TTL).await {
                    warn!(lock_id = %lock_id, error = %e, "failed to re-assert lock claim");
                }
            }
        });
        *self.heartbeat.lock() = Some(handle);
        Ok(())
    }

    pub async fn release(&self) -> Result<(), OtterError> {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        self.store
            .delete_claim(&self.lock_id, self.claim_id)
            .await?;
        Ok(())
    }

    /// Runs `work` while holding the lock, releasing it on either outcome.
    pub async fn with_lock<T, F>(&self, work: F) -> Result<T, OtterError>
    where
        F: std::future::Future<Output = Result<T, OtterError>>,
    {
        self.acquire().await?;
        let result = work.await;
        if let Err(e) = self.release().await {
            warn!(lock_id = %self.lock_id, error = %e, "failed to release claim lock");
        }
        result
    }
}

impl Drop for ClaimLock {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}
