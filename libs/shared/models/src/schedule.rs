use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Legacy per-weekday availability window. The service layer keeps at most
/// one row per provider per weekday by replacing the whole day on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Date-anchored availability rule, the current scheduling system.
/// Deactivation is a soft delete; resolvers only consider active rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub anchor: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: RecurrenceKind,
    pub recurrence_end: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An exception date that voids every window the provider would otherwise
/// have on that day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutDate {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub reason: Option<String>,
}
