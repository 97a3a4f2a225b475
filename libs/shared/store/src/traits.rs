use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use shared_models::{
    Appointment, AvailabilityRule, BlackoutDate, PartyRecord, SlotLock, WeeklyTemplate,
};

use crate::error::StoreError;

/// Read-only view of the identity collaborator's party records.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_party(&self, id: Uuid) -> Result<Option<PartyRecord>, StoreError>;
}

/// CRUD over the availability rule tables. Read-mostly during booking;
/// written only by provider-side schedule management.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn weekly_templates_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<WeeklyTemplate>, StoreError>;

    /// Replaces any existing row for the template's (provider, weekday).
    async fn replace_weekly_template(&self, template: &WeeklyTemplate) -> Result<(), StoreError>;

    async fn delete_weekly_template(
        &self,
        provider_id: Uuid,
        day_of_week: u8,
    ) -> Result<(), StoreError>;

    async fn insert_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError>;

    async fn update_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError>;

    async fn find_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, StoreError>;

    async fn active_rules_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityRule>, StoreError>;

    async fn insert_blackout(&self, blackout: &BlackoutDate) -> Result<(), StoreError>;

    async fn delete_blackout(&self, provider_id: Uuid, date: NaiveDate) -> Result<(), StoreError>;

    async fn blackouts_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BlackoutDate>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// The non-cancelled appointment at exactly this instant, if any.
    async fn find_active_at(
        &self,
        provider_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError>;
}

/// The distributed-lock seam. Exclusivity must come from the backing
/// store's own conditional-write primitive, never from process memory.
#[async_trait]
pub trait SlotLockStore: Send + Sync {
    /// Removes every lock whose expiry precedes `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Atomic conditional insert keyed by (provider_id, slot_start).
    /// Returns `false` when the key is already held.
    async fn try_insert(&self, lock: &SlotLock) -> Result<bool, StoreError>;

    async fn delete(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        locked_by: Uuid,
    ) -> Result<(), StoreError>;

    async fn find_live(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<SlotLock>, StoreError>;
}
