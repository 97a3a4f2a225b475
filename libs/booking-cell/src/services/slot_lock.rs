// libs/booking-cell/src/services/slot_lock.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::SlotLock;
use shared_store::{SlotLockStore, StoreError};

/// How long an unreleased lock may outlive its holder.
pub const SLOT_LOCK_TTL_SECONDS: i64 = 30;

/// Short-lived mutual exclusion over one (provider, instant) pair. The
/// store's conditional insert is the only arbiter; nothing in process
/// memory is trusted across handler instances.
pub struct SlotLockManager {
    locks: Arc<dyn SlotLockStore>,
    ttl: Duration,
}

impl SlotLockManager {
    pub fn new(locks: Arc<dyn SlotLockStore>) -> Self {
        Self {
            locks,
            ttl: Duration::seconds(SLOT_LOCK_TTL_SECONDS),
        }
    }

    /// Attempt to take the lock. Expired leftovers are purged first so a
    /// crashed holder can only ever block for one TTL. Returns `false` when
    /// a live lock already holds the key.
    pub async fn acquire(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        slot_end: DateTime<Utc>,
        requester: Uuid,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();

        let purged = self.locks.purge_expired(now).await?;
        if purged > 0 {
            warn!("Purged {} expired slot locks", purged);
        }

        let lock = SlotLock {
            provider_id,
            slot_start,
            slot_end,
            locked_by: requester,
            expires_at: now + self.ttl,
        };

        let acquired = self.locks.try_insert(&lock).await?;
        if acquired {
            debug!(
                "Slot lock acquired for provider {} at {} by {}",
                provider_id, slot_start, requester
            );
        } else {
            debug!(
                "Slot lock busy for provider {} at {}",
                provider_id, slot_start
            );
        }
        Ok(acquired)
    }

    /// Idempotent release. Storage errors are logged and swallowed so a
    /// cleanup failure can never mask the booking outcome.
    pub async fn release(&self, provider_id: Uuid, slot_start: DateTime<Utc>, requester: Uuid) {
        if let Err(e) = self.locks.delete(provider_id, slot_start, requester).await {
            warn!(
                "Failed to release slot lock for provider {} at {}: {}",
                provider_id, slot_start, e
            );
        } else {
            debug!(
                "Slot lock released for provider {} at {}",
                provider_id, slot_start
            );
        }
    }

    /// Whether a live (non-expired) lock holds the key.
    pub async fn is_locked(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let lock = self
            .locks
            .find_live(provider_id, slot_start, Utc::now())
            .await?;
        Ok(lock.is_some())
    }
}
