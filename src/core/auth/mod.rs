// src/core/auth/mod.rs

//! Per-tenant token and service-catalog cache over the identity exchange.

mod catalog;
mod identity;

pub use catalog::{CatalogService, Endpoint, ServiceCatalog};
pub use identity::{Credentials, IdentityClient, TenantSession};

use crate::core::errors::OtterError;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Safety margin subtracted from a token's expiry so a token is never handed
/// out moments before the cloud stops honoring it.
const EXPIRY_MARGIN_SECS: i64 = 60;

struct CachedSession {
    session: TenantSession,
    fetched_at: std::time::Instant,
}

type Slot = Arc<Mutex<Option<CachedSession>>>;

/// The process-wide auth cache. Concurrent `authenticate` calls for one
/// tenant coalesce to a single upstream request: each tenant has an async
/// mutex slot, and whoever holds it performs the exchange while the rest
/// wait and then read the freshly cached session.
pub struct CachingAuthenticator {
    identity: IdentityClient,
    slots: DashMap<String, Slot>,
    /// Fallback lifetime for tokens whose expiry the identity service omits.
    default_ttl: Duration,
}

impl CachingAuthenticator {
    pub fn new(identity: IdentityClient, default_ttl: Duration) -> Self {
        Self {
            identity,
            slots: DashMap::new(),
            default_ttl,
        }
    }

    fn slot(&self, tenant_id: &str) -> Slot {
        self.slots
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the cached `(token, catalog)` tuple if still valid, otherwise
    /// performs the token exchange and caches the result.
    pub async fn authenticate(&self, tenant_id: &str) -> Result<TenantSession, OtterError> {
        let slot = self.slot(tenant_id);
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if self.is_fresh(cached) {
                return Ok(cached.session.clone());
            }
        }

        debug!(tenant_id, "auth cache miss, performing token exchange");
        let session = self.identity.authenticate(tenant_id).await?;
        *guard = Some(CachedSession {
            session: session.clone(),
            fetched_at: std::time::Instant::now(),
        });
        Ok(session)
    }

    /// Drops the cached entry for a tenant, forcing the next `authenticate`
    /// to go upstream.
    pub async fn invalidate(&self, tenant_id: &str) {
        let slot = self.slot(tenant_id);
        let mut guard = slot.lock().await;
        *guard = None;
    }

    fn is_fresh(&self, cached: &CachedSession) -> bool {
        match cached.session.expires_at {
            Some(expires_at) => {
                Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < expires_at
            }
            None => cached.fetched_at.elapsed() < self.default_ttl,
        }
    }
}
