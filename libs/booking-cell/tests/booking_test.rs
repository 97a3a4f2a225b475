// libs/booking-cell/tests/booking_test.rs
use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

use booking_cell::models::{BookSlotRequest, BookingError};
use booking_cell::services::{BookingCoordinator, SlotLockManager};
use shared_models::{
    AppointmentStatus, ApprovalStatus, AvailabilityRule, BlackoutDate, PartyRecord, PartyRole,
    ProviderProfile, RecurrenceKind, SlotLock,
};
use shared_store::{MemoryStore, ScheduleStore, SlotLockStore};

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

fn patient_record(id: Uuid) -> PartyRecord {
    PartyRecord {
        id,
        role: PartyRole::Patient,
        timezone: "America/New_York".to_string(),
        has_completed_profile: true,
        provider_profile: None,
    }
}

fn provider_record(id: Uuid, approval_status: ApprovalStatus) -> PartyRecord {
    PartyRecord {
        id,
        role: PartyRole::Provider,
        timezone: "Europe/Berlin".to_string(),
        has_completed_profile: true,
        provider_profile: Some(ProviderProfile {
            approval_status,
            consultation_fee: 120.0,
        }),
    }
}

struct TestSetup {
    store: Arc<MemoryStore>,
    coordinator: BookingCoordinator,
    patient_id: Uuid,
    provider_id: Uuid,
    scheduled_at: DateTime<Utc>,
}

impl TestSetup {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let patient_id = Uuid::new_v4();
        let provider_id = Uuid::new_v4();

        store.upsert_party(patient_record(patient_id));
        store.upsert_party(provider_record(provider_id, ApprovalStatus::Approved));

        // Open all day every day so time-of-day choices stay simple.
        let now = Utc::now();
        store
            .insert_rule(&AvailabilityRule {
                id: Uuid::new_v4(),
                provider_id,
                anchor: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                start_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
                recurrence: RecurrenceKind::Daily,
                recurrence_end: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let coordinator = BookingCoordinator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            SlotLockManager::new(store.clone()),
        );

        let scheduled_at = (Utc::now() + Duration::days(1))
            .date_naive()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();

        Self {
            store,
            coordinator,
            patient_id,
            provider_id,
            scheduled_at,
        }
    }

    fn request(&self) -> BookSlotRequest {
        BookSlotRequest {
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            scheduled_at: self.scheduled_at,
            duration_minutes: None,
        }
    }

    fn request_for(&self, patient_id: Uuid) -> BookSlotRequest {
        BookSlotRequest {
            patient_id,
            ..self.request()
        }
    }

    fn seed_patient(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.upsert_party(patient_record(id));
        id
    }
}

// ==============================================================================
// HAPPY PATH
// ==============================================================================

#[tokio::test]
async fn booking_commits_a_confirmed_appointment_with_snapshots() {
    let setup = TestSetup::new().await;

    let appointment = setup.coordinator.book_slot(setup.request()).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert_eq!(appointment.patient_id, setup.patient_id);
    assert_eq!(appointment.provider_id, setup.provider_id);
    assert_eq!(appointment.scheduled_at, setup.scheduled_at);
    assert_eq!(appointment.duration_minutes, 30);
    assert_eq!(appointment.consultation_fee, 120.0);
    assert_eq!(appointment.provider_timezone, "Europe/Berlin");
    assert_eq!(appointment.patient_timezone, "America/New_York");

    assert_eq!(setup.store.appointment_count(), 1);
    // The lock must be gone the moment the call returns.
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn explicit_duration_is_respected() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.duration_minutes = Some(45);

    let appointment = setup.coordinator.book_slot(request).await.unwrap();
    assert_eq!(appointment.duration_minutes, 45);
    assert_eq!(
        appointment.scheduled_end(),
        setup.scheduled_at + Duration::minutes(45)
    );
}

// ==============================================================================
// CONFLICTS
// ==============================================================================

#[tokio::test]
async fn rebooking_a_taken_slot_conflicts_after_prompt_lock_release() {
    let setup = TestSetup::new().await;

    setup.coordinator.book_slot(setup.request()).await.unwrap();

    // The immediate follow-up proves the winner's lock was released rather
    // than held for its full TTL: the loser reaches the recheck and fails
    // there, not at lock acquisition.
    let other_patient = setup.seed_patient();
    let err = setup
        .coordinator
        .book_slot(setup.request_for(other_patient))
        .await
        .unwrap_err();

    assert_matches!(err, BookingError::Conflict(ref message) if message.contains("no longer available"));
    assert_eq!(setup.store.appointment_count(), 1);
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn concurrent_attempts_commit_exactly_once() {
    let setup = TestSetup::new().await;

    let patients: Vec<Uuid> = (0..4).map(|_| setup.seed_patient()).collect();
    let attempts = patients
        .iter()
        .map(|patient| setup.coordinator.book_slot(setup.request_for(*patient)));

    let outcomes = join_all(attempts).await;

    let committed = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(committed, 1);
    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert_matches!(e, BookingError::Conflict(_));
        }
    }

    assert_eq!(setup.store.appointment_count(), 1);
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn busy_lock_conflicts_before_any_appointment_access() {
    let setup = TestSetup::new().await;

    // Another in-flight attempt holds the slot.
    let other = SlotLockManager::new(setup.store.clone());
    let holder = Uuid::new_v4();
    assert!(other
        .acquire(
            setup.provider_id,
            setup.scheduled_at,
            setup.scheduled_at + Duration::minutes(30),
            holder,
        )
        .await
        .unwrap());

    let err = setup.coordinator.book_slot(setup.request()).await.unwrap_err();
    assert_matches!(err, BookingError::Conflict(_));
    assert_eq!(setup.store.appointment_count(), 0);

    // Once the holder releases, booking goes through.
    other.release(setup.provider_id, setup.scheduled_at, holder).await;
    assert!(setup.coordinator.book_slot(setup.request()).await.is_ok());
}

#[tokio::test]
async fn stale_lock_from_a_crashed_holder_does_not_block() {
    let setup = TestSetup::new().await;

    let stale = SlotLock {
        provider_id: setup.provider_id,
        slot_start: setup.scheduled_at,
        slot_end: setup.scheduled_at + Duration::minutes(30),
        locked_by: Uuid::new_v4(),
        expires_at: Utc::now() - Duration::seconds(60),
    };
    assert!(setup.store.try_insert(&stale).await.unwrap());

    let appointment = setup.coordinator.book_slot(setup.request()).await.unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn blackout_discovered_at_recheck_conflicts() {
    let setup = TestSetup::new().await;

    setup
        .store
        .insert_blackout(&BlackoutDate {
            id: Uuid::new_v4(),
            provider_id: setup.provider_id,
            date: setup.scheduled_at.date_naive(),
            reason: None,
        })
        .await
        .unwrap();

    let err = setup.coordinator.book_slot(setup.request()).await.unwrap_err();
    assert_matches!(err, BookingError::Conflict(_));
    assert_eq!(setup.store.appointment_count(), 0);
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn slot_outside_every_window_conflicts() {
    let setup = TestSetup::new().await;

    // The seeded window is [00:00, 23:30); 23:45 falls outside it.
    let mut request = setup.request();
    request.scheduled_at = setup
        .scheduled_at
        .date_naive()
        .and_hms_opt(23, 45, 0)
        .unwrap()
        .and_utc();

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::Conflict(_));
    assert_eq!(setup.store.lock_count(), 0);
}

// ==============================================================================
// VALIDATION (NO LOCK EVER REQUESTED)
// ==============================================================================

#[tokio::test]
async fn past_instants_are_rejected_before_locking() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.scheduled_at = Utc::now() - Duration::hours(1);

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::Validation(_));
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn bookings_beyond_the_horizon_are_rejected() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.scheduled_at = Utc::now() + Duration::days(120);

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::Validation(_));
}

#[tokio::test]
async fn too_short_durations_are_rejected() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.duration_minutes = Some(10);

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::Validation(_));
}

#[tokio::test]
async fn unknown_patient_is_not_found() {
    let setup = TestSetup::new().await;

    let err = setup
        .coordinator
        .book_slot(setup.request_for(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::NotFound(_));
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let setup = TestSetup::new().await;

    let mut request = setup.request();
    request.provider_id = Uuid::new_v4();

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::NotFound(_));
}

#[tokio::test]
async fn provider_role_cannot_book_as_patient() {
    let setup = TestSetup::new().await;

    let err = setup
        .coordinator
        .book_slot(setup.request_for(setup.provider_id))
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::Forbidden(_));
}

#[tokio::test]
async fn incomplete_patient_profile_is_forbidden() {
    let setup = TestSetup::new().await;

    let incomplete = Uuid::new_v4();
    let mut record = patient_record(incomplete);
    record.has_completed_profile = false;
    setup.store.upsert_party(record);

    let err = setup
        .coordinator
        .book_slot(setup.request_for(incomplete))
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::Forbidden(_));
}

#[tokio::test]
async fn unapproved_provider_is_forbidden() {
    let setup = TestSetup::new().await;

    let pending = Uuid::new_v4();
    setup
        .store
        .upsert_party(provider_record(pending, ApprovalStatus::Pending));

    let mut request = setup.request();
    request.provider_id = pending;

    let err = setup.coordinator.book_slot(request).await.unwrap_err();
    assert_matches!(err, BookingError::Forbidden(_));
    assert_eq!(setup.store.lock_count(), 0);
}

// ==============================================================================
// LOCK-FREE PREVIEW
// ==============================================================================

#[tokio::test]
async fn availability_preview_tracks_the_booked_state() {
    let setup = TestSetup::new().await;

    assert!(setup
        .coordinator
        .is_slot_available(setup.provider_id, setup.scheduled_at)
        .await
        .unwrap());

    setup.coordinator.book_slot(setup.request()).await.unwrap();

    assert!(!setup
        .coordinator
        .is_slot_available(setup.provider_id, setup.scheduled_at)
        .await
        .unwrap());

    // The preview never acquires a lock.
    assert_eq!(setup.store.lock_count(), 0);
}

#[tokio::test]
async fn availability_preview_sees_windows_and_blackouts() {
    let setup = TestSetup::new().await;

    let off_window = setup
        .scheduled_at
        .date_naive()
        .and_hms_opt(23, 45, 0)
        .unwrap()
        .and_utc();
    assert!(!setup
        .coordinator
        .is_slot_available(setup.provider_id, off_window)
        .await
        .unwrap());

    setup
        .store
        .insert_blackout(&BlackoutDate {
            id: Uuid::new_v4(),
            provider_id: setup.provider_id,
            date: setup.scheduled_at.date_naive(),
            reason: None,
        })
        .await
        .unwrap();
    assert!(!setup
        .coordinator
        .is_slot_available(setup.provider_id, setup.scheduled_at)
        .await
        .unwrap());
}
