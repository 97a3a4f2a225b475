// libs/shared/store/src/postgrest.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentStatus, AvailabilityRule, BlackoutDate, PartyRecord, SlotLock,
    WeeklyTemplate,
};

use crate::error::StoreError;
use crate::traits::{AppointmentStore, DirectoryStore, ScheduleStore, SlotLockStore};

/// PostgREST-backed store. The slot-lock table is expected to carry a
/// unique key on (provider_id, slot_start) so a conditional insert is a
/// plain POST that answers 409 when the key is taken.
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl PostgrestStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.store_url.clone(),
            anon_key: config.store_anon_key.clone(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.anon_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }

        headers
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making store request to {}", url);

        let mut headers = self.headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Store api error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                409 => StoreError::Conflict,
                code => StoreError::Api {
                    status: code,
                    message: error_text,
                },
            });
        }

        Ok(response)
    }

    async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Fire-and-check variant for writes whose response body is ignored.
    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<(), StoreError> {
        self.send(method, path, body, None).await?;
        Ok(())
    }

    /// Write that asks PostgREST to return the affected rows.
    async fn execute_returning(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let response = self.send(method, path, body, Some(headers)).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn encode_instant(at: DateTime<Utc>) -> String {
        urlencoding::encode(&at.to_rfc3339()).into_owned()
    }
}

#[async_trait]
impl DirectoryStore for PostgrestStore {
    async fn find_party(&self, id: Uuid) -> Result<Option<PartyRecord>, StoreError> {
        let path = format!("/rest/v1/parties?id=eq.{}", id);
        let result: Vec<PartyRecord> = self.request(Method::GET, &path, None).await?;
        Ok(result.into_iter().next())
    }
}

#[async_trait]
impl ScheduleStore for PostgrestStore {
    async fn weekly_templates_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<WeeklyTemplate>, StoreError> {
        let path = format!(
            "/rest/v1/weekly_templates?provider_id=eq.{}&order=day_of_week.asc",
            provider_id
        );
        self.request(Method::GET, &path, None).await
    }

    async fn replace_weekly_template(&self, template: &WeeklyTemplate) -> Result<(), StoreError> {
        self.delete_weekly_template(template.provider_id, template.day_of_week)
            .await?;

        let body = json!({
            "id": template.id,
            "provider_id": template.provider_id,
            "day_of_week": template.day_of_week,
            "start_time": template.start_time,
            "end_time": template.end_time,
        });
        self.execute(Method::POST, "/rest/v1/weekly_templates", Some(body))
            .await
    }

    async fn delete_weekly_template(
        &self,
        provider_id: Uuid,
        day_of_week: u8,
    ) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/weekly_templates?provider_id=eq.{}&day_of_week=eq.{}",
            provider_id, day_of_week
        );
        self.execute(Method::DELETE, &path, None).await
    }

    async fn insert_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError> {
        let body = json!({
            "id": rule.id,
            "provider_id": rule.provider_id,
            "anchor": rule.anchor,
            "start_time": rule.start_time,
            "end_time": rule.end_time,
            "recurrence": rule.recurrence,
            "recurrence_end": rule.recurrence_end,
            "is_active": rule.is_active,
            "created_at": rule.created_at.to_rfc3339(),
            "updated_at": rule.updated_at.to_rfc3339(),
        });
        self.execute(Method::POST, "/rest/v1/availability_rules", Some(body))
            .await
    }

    async fn update_rule(&self, rule: &AvailabilityRule) -> Result<(), StoreError> {
        let path = format!("/rest/v1/availability_rules?id=eq.{}", rule.id);
        let body = json!({
            "anchor": rule.anchor,
            "start_time": rule.start_time,
            "end_time": rule.end_time,
            "recurrence": rule.recurrence,
            "recurrence_end": rule.recurrence_end,
            "is_active": rule.is_active,
            "updated_at": rule.updated_at.to_rfc3339(),
        });
        self.execute(Method::PATCH, &path, Some(body)).await
    }

    async fn find_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, StoreError> {
        let path = format!("/rest/v1/availability_rules?id=eq.{}", rule_id);
        let result: Vec<AvailabilityRule> = self.request(Method::GET, &path, None).await?;
        Ok(result.into_iter().next())
    }

    async fn active_rules_for(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<AvailabilityRule>, StoreError> {
        let path = format!(
            "/rest/v1/availability_rules?provider_id=eq.{}&is_active=eq.true&order=anchor.asc",
            provider_id
        );
        self.request(Method::GET, &path, None).await
    }

    async fn insert_blackout(&self, blackout: &BlackoutDate) -> Result<(), StoreError> {
        let body = json!({
            "id": blackout.id,
            "provider_id": blackout.provider_id,
            "date": blackout.date,
            "reason": blackout.reason,
        });
        self.execute(Method::POST, "/rest/v1/blackout_dates", Some(body))
            .await
    }

    async fn delete_blackout(&self, provider_id: Uuid, date: NaiveDate) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/blackout_dates?provider_id=eq.{}&date=eq.{}",
            provider_id, date
        );
        self.execute(Method::DELETE, &path, None).await
    }

    async fn blackouts_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BlackoutDate>, StoreError> {
        let path = format!(
            "/rest/v1/blackout_dates?provider_id=eq.{}&date=eq.{}",
            provider_id, date
        );
        self.request(Method::GET, &path, None).await
    }
}

#[async_trait]
impl AppointmentStore for PostgrestStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let body = json!({
            "id": appointment.id,
            "patient_id": appointment.patient_id,
            "provider_id": appointment.provider_id,
            "scheduled_at": appointment.scheduled_at.to_rfc3339(),
            "duration_minutes": appointment.duration_minutes,
            "status": appointment.status,
            "consultation_fee": appointment.consultation_fee,
            "provider_timezone": appointment.provider_timezone,
            "patient_timezone": appointment.patient_timezone,
            "created_at": appointment.created_at.to_rfc3339(),
        });
        self.execute(Method::POST, "/rest/v1/appointments", Some(body))
            .await
    }

    async fn find_active_at(
        &self,
        provider_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&scheduled_at=eq.{}&status=neq.{}",
            provider_id,
            Self::encode_instant(at),
            AppointmentStatus::Cancelled
        );
        let result: Vec<Appointment> = self.request(Method::GET, &path, None).await?;
        Ok(result.into_iter().next())
    }
}

#[async_trait]
impl SlotLockStore for PostgrestStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let path = format!(
            "/rest/v1/slot_locks?expires_at=lt.{}",
            Self::encode_instant(now)
        );
        let purged = self
            .execute_returning(Method::DELETE, &path, None)
            .await?;
        Ok(purged.len() as u64)
    }

    async fn try_insert(&self, lock: &SlotLock) -> Result<bool, StoreError> {
        let body = json!({
            "provider_id": lock.provider_id,
            "slot_start": lock.slot_start.to_rfc3339(),
            "slot_end": lock.slot_end.to_rfc3339(),
            "locked_by": lock.locked_by,
            "expires_at": lock.expires_at.to_rfc3339(),
        });

        match self
            .execute(Method::POST, "/rest/v1/slot_locks", Some(body))
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::Conflict) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        locked_by: Uuid,
    ) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/slot_locks?provider_id=eq.{}&slot_start=eq.{}&locked_by=eq.{}",
            provider_id,
            Self::encode_instant(slot_start),
            locked_by
        );
        self.execute(Method::DELETE, &path, None).await
    }

    async fn find_live(
        &self,
        provider_id: Uuid,
        slot_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<SlotLock>, StoreError> {
        let path = format!(
            "/rest/v1/slot_locks?provider_id=eq.{}&slot_start=eq.{}&expires_at=gte.{}",
            provider_id,
            Self::encode_instant(slot_start),
            Self::encode_instant(now)
        );
        let result: Vec<SlotLock> = self.request(Method::GET, &path, None).await?;
        Ok(result.into_iter().next())
    }
}
