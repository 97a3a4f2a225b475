// libs/booking-cell/src/services/coordinator.rs
//
// Booking runs Validate -> AcquireLock -> Recheck -> Commit -> Release.
// Release executes on every path once the lock stage was reached, and a
// recheck conflict only reaches the caller after the lock is gone.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scheduling_cell::services::resolver;
use shared_models::{Appointment, AppointmentStatus, ApprovalStatus, PartyRole};
use shared_store::{AppointmentStore, DirectoryStore, ScheduleStore};

use crate::models::{BookSlotRequest, BookingError};
use crate::services::slot_lock::SlotLockManager;

pub const DEFAULT_DURATION_MINUTES: i32 = 30;
pub const MIN_DURATION_MINUTES: i32 = 15;
pub const BOOKING_HORIZON_DAYS: i64 = 90;

/// Fee and timezone snapshots resolved during validation, carried through
/// to the committed appointment.
struct BookingContext {
    patient_timezone: String,
    provider_timezone: String,
    consultation_fee: f64,
}

pub struct BookingCoordinator {
    directory: Arc<dyn DirectoryStore>,
    schedule: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    locks: SlotLockManager,
}

impl BookingCoordinator {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        schedule: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        locks: SlotLockManager,
    ) -> Self {
        Self {
            directory,
            schedule,
            appointments,
            locks,
        }
    }

    /// Book one slot for a patient. Exactly one of any set of concurrent
    /// attempts on the same (provider, instant) commits; the rest receive a
    /// conflict without waiting.
    pub async fn book_slot(&self, request: BookSlotRequest) -> Result<Appointment, BookingError> {
        debug!(
            "Booking slot for patient {} with provider {} at {}",
            request.patient_id, request.provider_id, request.scheduled_at
        );

        let context = self.validate(&request).await?;
        let duration = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        let slot_end = request.scheduled_at + Duration::minutes(duration as i64);

        let acquired = self
            .locks
            .acquire(
                request.provider_id,
                request.scheduled_at,
                slot_end,
                request.patient_id,
            )
            .await?;
        if !acquired {
            warn!(
                "Slot lock busy for provider {} at {}",
                request.provider_id, request.scheduled_at
            );
            return Err(BookingError::Conflict(
                "slot is being booked by another request".into(),
            ));
        }

        let outcome = self.recheck_and_commit(&request, duration, context).await;

        // Unconditional, even when recheck or commit failed.
        self.locks
            .release(request.provider_id, request.scheduled_at, request.patient_id)
            .await;

        match &outcome {
            Ok(appointment) => info!(
                "Appointment {} committed for provider {} at {}",
                appointment.id, appointment.provider_id, appointment.scheduled_at
            ),
            Err(e) => debug!("Booking attempt failed after lock stage: {}", e),
        }
        outcome
    }

    /// Lock-free preview of the recheck stage. Best effort only: without
    /// the lock the answer can be stale by the time the caller acts on it.
    pub async fn is_slot_available(
        &self,
        provider_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        match self.recheck(provider_id, scheduled_at).await {
            Ok(()) => Ok(true),
            Err(BookingError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Validate stage. Runs before any lock is requested; every failure
    /// here returns without touching the lock or appointment tables.
    async fn validate(&self, request: &BookSlotRequest) -> Result<BookingContext, BookingError> {
        if let Some(duration) = request.duration_minutes {
            if duration < MIN_DURATION_MINUTES {
                return Err(BookingError::Validation(format!(
                    "appointment duration must be at least {} minutes",
                    MIN_DURATION_MINUTES
                )));
            }
        }

        let now = Utc::now();
        if request.scheduled_at <= now {
            return Err(BookingError::Validation(
                "appointment time must be in the future".into(),
            ));
        }
        if request.scheduled_at > now + Duration::days(BOOKING_HORIZON_DAYS) {
            return Err(BookingError::Validation(format!(
                "appointment cannot be booked more than {} days in advance",
                BOOKING_HORIZON_DAYS
            )));
        }

        let patient = self
            .directory
            .find_party(request.patient_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("patient {}", request.patient_id)))?;
        if patient.role != PartyRole::Patient {
            return Err(BookingError::Forbidden(
                "booking party does not have the patient role".into(),
            ));
        }
        if !patient.has_completed_profile {
            return Err(BookingError::Forbidden(
                "patient profile is incomplete".into(),
            ));
        }

        let provider = self
            .directory
            .find_party(request.provider_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("provider {}", request.provider_id)))?;
        if provider.role != PartyRole::Provider {
            return Err(BookingError::Forbidden(
                "booked party does not have the provider role".into(),
            ));
        }
        let profile = provider.provider_profile.as_ref().ok_or_else(|| {
            BookingError::NotFound(format!("provider profile for {}", provider.id))
        })?;
        if profile.approval_status != ApprovalStatus::Approved {
            return Err(BookingError::Forbidden(
                "provider is not approved for booking".into(),
            ));
        }

        Ok(BookingContext {
            patient_timezone: patient.timezone.clone(),
            provider_timezone: provider.timezone.clone(),
            consultation_fee: profile.consultation_fee,
        })
    }

    /// Recheck stage, valid with or without the lock held. Acquiring the
    /// lock does not prove the slot was free before the lock existed, nor
    /// that the schedule is unchanged since the caller last saw it.
    async fn recheck(
        &self,
        provider_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if self
            .appointments
            .find_active_at(provider_id, scheduled_at)
            .await?
            .is_some()
        {
            return Err(BookingError::Conflict("slot no longer available".into()));
        }

        let date = scheduled_at.date_naive();
        let blackouts = self.schedule.blackouts_for(provider_id, date).await?;
        if !blackouts.is_empty() {
            return Err(BookingError::Conflict(format!(
                "provider is unavailable on {}",
                date
            )));
        }

        let templates = self.schedule.weekly_templates_for(provider_id).await?;
        let rules = self.schedule.active_rules_for(provider_id).await?;
        if !resolver::covers(date, scheduled_at.time(), &templates, &rules) {
            return Err(BookingError::Conflict(
                "slot no longer falls within an available window".into(),
            ));
        }

        Ok(())
    }

    async fn recheck_and_commit(
        &self,
        request: &BookSlotRequest,
        duration: i32,
        context: BookingContext,
    ) -> Result<Appointment, BookingError> {
        self.recheck(request.provider_id, request.scheduled_at)
            .await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            provider_id: request.provider_id,
            scheduled_at: request.scheduled_at,
            duration_minutes: duration,
            status: AppointmentStatus::Confirmed,
            consultation_fee: context.consultation_fee,
            provider_timezone: context.provider_timezone,
            patient_timezone: context.patient_timezone,
            created_at: Utc::now(),
        };
        self.appointments.insert(&appointment).await?;

        Ok(appointment)
    }
}
