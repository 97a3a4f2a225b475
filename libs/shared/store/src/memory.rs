use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AvailabilityRule, BlackoutDate, PartyRecord, SlotLock,
    WeeklyTemplate,
};

use crate::error::StoreError;
use crate::traits::{AppointmentStore, DirectoryStore, ScheduleStore, SlotLockStore};

#[derive(Default)]
struct MemoryInner {
    parties: HashMap<Uuid, PartyRecord>,
    templates: Vec<WeeklyTemplate>,
    rules: Vec<AvailabilityRule>,
    blackouts: Vec<BlackoutDate>,
    locks: HashMap<(Uuid, DateTime<Utc>), SlotLock>,
    appointments: Vec<Appointment>,
}

/// In-process backend over a mutex-guarded map. The slot-lock insert is a
/// single guarded check-and-set, so it honours the same conditional-write
/// contract as the unique-keyed table behind `PostgrestStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds or replaces a directory record.
    pub fn upsert_party(&self, party: PartyRecord) {
        self.inner().parties.insert(party.id, party);
    }

    pub fn live_lock_count(&self, now: DateTime<Utc>) -> usize {
        self.inner()
            .locks
            .values()
            .filter(|lock| !lock.is_expired(now))
            .count()
    }

    pub fn lock_count(&self) -> usize {
        self.inner().locks.len()
    }

    pub fn appointment_count(&self) -> usize {
        self.inner().appointments.len()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn find_party(&self, id: Uuid) -> Result<Option<PartyRecord>, StoreError> {
        Ok(self.inner().parties.get(&id).cloned())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn weekly_templates_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<WeeklyTemplate>, StoreError> {
        let mut templates: Vec<WeeklyTemplate> = self
            .inner()
            .templates
            .iter()
            .filter(|t| t.provider_id == provider_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| t.day_of_week);
        Ok(templates)
    }

    async fn replace_weekly_template(&self, template: &WeeklyTemplate) -> Result<(), StoreError> {
        let mut inner = self.inner();
        inner
            .templates
            .retain(|t| !(t.provider_id == template.provider_id && t.day_of_week == template.day_of_week));
        inner.templates.push(template.clone());
        Ok(())
    }

    async fn delete_weekly_template(
        &self,
        provider_id: Uuid,
        day_of_week: u8,
    ) -> Result<(), StoreError> {
        self.inner()
            .templates
            .retain(|t| !(t.provider_id == provider_id && t.day_of_week == day_of_week));
        Ok(())
    }

    async fn insert_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError> {
        self.inner().rules.push(rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError> {
        let mut inner = self.inner();
        match inner.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(())
            }
            None => Err(StoreError::Api {
                status: 404,
                message: format!("no availability rule with id {}", rule.id),
            }),
        }
    }

    async fn find_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, StoreError> {
        Ok(self.inner().rules.iter().find(|r| r.id == rule_id).cloned())
    }

    async fn active_rules_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityRule>, StoreError> {
        let mut rules: Vec<AvailabilityRule> = self
            .inner()
            .rules
            .iter()
            .filter(|r| r.provider_id == provider_id && r.is_active)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.anchor);
        Ok(rules)
    }

    async fn insert_blackout(&self, blackout: &BlackoutDate) -> Result<(), StoreError> {
        self.inner().blackouts.push(blackout.clone());
        Ok(())
    }

    async fn delete_blackout(&self, provider_id: Uuid, date: NaiveDate) -> Result<(), StoreError> {
        self.inner()
            .blackouts
            .retain(|b| !(b.provider_id == provider_id && b.date == date));
        Ok(())
    }

    async fn blackouts_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BlackoutDate>, StoreError> {
        Ok(self
            .inner()
            .blackouts
            .iter()
            .filter(|b| b.provider_id == provider_id && b.date == date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.inner().appointments.push(appointment.clone());
        Ok(())
    }

    async fn find_active_at(
        &self,
        provider_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        Ok(self
            .inner()
            .appointments
            .iter()
            .find(|a| {
                a.provider_id == provider_id
                    && a.scheduled_at == at
                    && a.status != AppointmentStatus::Cancelled
            })
            .cloned())
    }
}

#[async_trait]
impl SlotLockStore for MemoryStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner();
        let before = inner.locks.len();
        inner.locks.retain(|_, lock| !lock.is_expired(now));
        Ok((before - inner.locks.len()) as u64)
    }

    async fn try_insert(&self, lock: &SlotLock) -> Result<bool, StoreError> {
        let mut inner = self.inner();
        let key = (lock.provider_id, lock.slot_start);
        if inner.locks.contains_key(&key) {
            return Ok(false);
        }
        inner.locks.insert(key, lock.clone());
        Ok(true)
    }

    async fn delete(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        locked_by: Uuid,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        let key = (provider_id, slot_start);
        if inner
            .locks
            .get(&key)
            .is_some_and(|lock| lock.locked_by == locked_by)
        {
            inner.locks.remove(&key);
        }
        Ok(())
    }

    async fn find_live(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<SlotLock>, StoreError> {
        Ok(self
            .inner()
            .locks
            .get(&(provider_id, slot_start))
            .filter(|lock| !lock.is_expired(now))
            .cloned())
    }
}
