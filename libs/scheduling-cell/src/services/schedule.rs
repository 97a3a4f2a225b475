// libs/scheduling-cell/src/services/schedule.rs
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::{AvailabilityRule, BlackoutDate, WeeklyTemplate};
use shared_store::{DirectoryStore, ScheduleStore};

use crate::models::{
    AvailabilityResponse, CreateBlackoutRequest, CreateRuleRequest, DaySchedule, RemovalMode,
    ScheduleError, SetWeeklyTemplateRequest,
};
use crate::services::recurrence::{self, RuleEdit};
use crate::services::resolver;

/// Provider-side schedule management and read-only availability resolution.
/// Never touches slot locks or committed appointments.
pub struct ScheduleService {
    directory: Arc<dyn DirectoryStore>,
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleService {
    pub fn new(directory: Arc<dyn DirectoryStore>, store: Arc<dyn ScheduleStore>) -> Self {
        Self { directory, store }
    }

    /// Create a date-anchored availability rule.
    pub async fn create_rule(
        &self,
        request: CreateRuleRequest,
    ) -> Result<AvailabilityRule, ScheduleError> {
        debug!("Creating availability rule for provider {}", request.provider_id);

        if request.start_time >= request.end_time {
            return Err(ScheduleError::Validation(
                "start time must be before end time".into(),
            ));
        }
        if let Some(end) = request.recurrence_end {
            if end < request.anchor {
                return Err(ScheduleError::Validation(
                    "recurrence end must not precede the anchor date".into(),
                ));
            }
        }

        let now = Utc::now();
        let rule = AvailabilityRule {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            anchor: request.anchor,
            start_time: request.start_time,
            end_time: request.end_time,
            recurrence: request.recurrence,
            recurrence_end: request.recurrence_end,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_rule(&rule).await?;

        info!("Availability rule {} created for provider {}", rule.id, rule.provider_id);
        Ok(rule)
    }

    /// Remove all of a rule, one occurrence, or an occurrence tail.
    pub async fn delete_rule(
        &self,
        rule_id: Uuid,
        mode: RemovalMode,
        from_date: Option<NaiveDate>,
    ) -> Result<(), ScheduleError> {
        debug!("Deleting availability rule {} with mode {:?}", rule_id, mode);

        let rule = self
            .store
            .find_rule(rule_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("availability rule {}", rule_id)))?;

        let edit = recurrence::plan_removal(&rule, mode, from_date)?;
        self.apply_edit(rule, edit).await
    }

    async fn apply_edit(
        &self,
        mut rule: AvailabilityRule,
        edit: RuleEdit,
    ) -> Result<(), ScheduleError> {
        let now = Utc::now();

        match edit {
            RuleEdit::Split {
                head_end,
                tail_anchor,
            } => {
                let tail = AvailabilityRule {
                    id: Uuid::new_v4(),
                    provider_id: rule.provider_id,
                    anchor: tail_anchor,
                    start_time: rule.start_time,
                    end_time: rule.end_time,
                    recurrence: rule.recurrence,
                    recurrence_end: rule.recurrence_end,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };

                rule.recurrence_end = Some(head_end);
                rule.updated_at = now;
                self.store.update_rule(&rule).await?;
                self.store.insert_rule(&tail).await?;

                info!(
                    "Availability rule {} split at {}; tail rule {} resumes at {}",
                    rule.id, head_end, tail.id, tail_anchor
                );
                return Ok(());
            }
            RuleEdit::Deactivate => rule.is_active = false,
            RuleEdit::AdvanceAnchor(next) => rule.anchor = next,
            RuleEdit::RegressEnd(previous) => rule.recurrence_end = Some(previous),
            RuleEdit::Truncate(head_end) => rule.recurrence_end = Some(head_end),
        }
        rule.updated_at = now;
        self.store.update_rule(&rule).await?;

        info!("Availability rule {} updated ({:?})", rule.id, edit);
        Ok(())
    }

    /// Replace the weekly template for one weekday. The delete-then-insert
    /// keeps at most one row per (provider, weekday).
    pub async fn set_weekly_template(
        &self,
        request: SetWeeklyTemplateRequest,
    ) -> Result<WeeklyTemplate, ScheduleError> {
        if request.start_time >= request.end_time {
            return Err(ScheduleError::Validation(
                "start time must be before end time".into(),
            ));
        }
        if request.day_of_week > 6 {
            return Err(ScheduleError::Validation(
                "day of week must be between 0 (Sunday) and 6 (Saturday)".into(),
            ));
        }

        let template = WeeklyTemplate {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
        };
        self.store.replace_weekly_template(&template).await?;

        debug!(
            "Weekly template set for provider {} on weekday {}",
            template.provider_id, template.day_of_week
        );
        Ok(template)
    }

    pub async fn delete_weekly_template(
        &self,
        provider_id: Uuid,
        day_of_week: u8,
    ) -> Result<(), ScheduleError> {
        self.store
            .delete_weekly_template(provider_id, day_of_week)
            .await?;
        Ok(())
    }

    pub async fn create_blackout(
        &self,
        request: CreateBlackoutRequest,
    ) -> Result<BlackoutDate, ScheduleError> {
        let blackout = BlackoutDate {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            date: request.date,
            reason: request.reason,
        };
        self.store.insert_blackout(&blackout).await?;

        info!(
            "Blackout created for provider {} on {}",
            blackout.provider_id, blackout.date
        );
        Ok(blackout)
    }

    pub async fn delete_blackout(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), ScheduleError> {
        self.store.delete_blackout(provider_id, date).await?;
        Ok(())
    }

    /// Resolve a provider's open slots for one date.
    pub async fn resolve_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<AvailabilityResponse, ScheduleError> {
        debug!("Resolving availability for provider {} on {}", provider_id, date);

        let provider = self
            .directory
            .find_party(provider_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(format!("provider {}", provider_id)))?;

        let templates = self.store.weekly_templates_for(provider_id).await?;
        let rules = self.store.active_rules_for(provider_id).await?;
        let blackouts = self.store.blackouts_for(provider_id, date).await?;

        let day = resolver::resolve_day(date, &templates, &rules, &blackouts);
        Ok(AvailabilityResponse {
            available: day.available,
            slots: day.slots,
            timezone: provider.timezone,
        })
    }

    /// Day-by-day availability over a short horizon, for schedule overviews.
    pub async fn resolve_availability_range(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        days: u32,
    ) -> Result<Vec<DaySchedule>, ScheduleError> {
        if self.directory.find_party(provider_id).await?.is_none() {
            return Err(ScheduleError::NotFound(format!("provider {}", provider_id)));
        }

        let templates = self.store.weekly_templates_for(provider_id).await?;
        let rules = self.store.active_rules_for(provider_id).await?;

        let mut schedule = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let Some(date) = from.checked_add_days(Days::new(offset as u64)) else {
                break;
            };
            let blackouts = self.store.blackouts_for(provider_id, date).await?;
            let day = resolver::resolve_day(date, &templates, &rules, &blackouts);
            schedule.push(DaySchedule {
                date,
                available: day.available,
                slots: day.slots,
            });
        }

        Ok(schedule)
    }
}
