// libs/scheduling-cell/src/services/recurrence.rs
//
// Occurrence math for date-anchored rules, and the planner that reshapes a
// recurring rule when one occurrence (or a tail of occurrences) is removed.
// Plans are applied by the schedule service; nothing here touches storage,
// locks, or committed appointments.

use chrono::{Datelike, Days, Months, NaiveDate};

use shared_models::{AvailabilityRule, RecurrenceKind};

use crate::models::{RemovalMode, ScheduleError};

/// The storage-level reshaping a removal requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEdit {
    /// Soft-delete the whole rule.
    Deactivate,
    /// Move the anchor forward to the next occurrence.
    AdvanceAnchor(NaiveDate),
    /// Pull the recurrence end back to the previous occurrence.
    RegressEnd(NaiveDate),
    /// Cap the rule at the given date, dropping everything after it.
    Truncate(NaiveDate),
    /// Cut an interior occurrence: cap the original at `head_end` and start
    /// a second rule with the same window at `tail_anchor`.
    Split {
        head_end: NaiveDate,
        tail_anchor: NaiveDate,
    },
}

/// Whether `date` is an occurrence the rule currently produces.
pub fn occurs_on(rule: &AvailabilityRule, date: NaiveDate) -> bool {
    if date < rule.anchor {
        return false;
    }
    if let Some(end) = rule.recurrence_end {
        if date > end {
            return false;
        }
    }

    match rule.recurrence {
        RecurrenceKind::None => date == rule.anchor,
        RecurrenceKind::Daily => true,
        RecurrenceKind::Weekly => date.weekday() == rule.anchor.weekday(),
        // Same day-of-month as the anchor; months without that day are
        // skipped rather than clamped to their last day.
        RecurrenceKind::Monthly => date.day() == rule.anchor.day(),
    }
}

/// The first occurrence after `occurrence`, staying within the rule's
/// recurrence end. `occurrence` must itself be a date the rule produces.
pub fn next_occurrence_after(rule: &AvailabilityRule, occurrence: NaiveDate) -> Option<NaiveDate> {
    let candidate = match rule.recurrence {
        RecurrenceKind::None => return None,
        RecurrenceKind::Daily => occurrence.checked_add_days(Days::new(1))?,
        RecurrenceKind::Weekly => occurrence.checked_add_days(Days::new(7))?,
        RecurrenceKind::Monthly => next_month_with_day(occurrence, rule.anchor.day())?,
    };

    match rule.recurrence_end {
        Some(end) if candidate > end => None,
        _ => Some(candidate),
    }
}

/// The last occurrence before `occurrence`, never regressing past the
/// anchor. `occurrence` must itself be a date the rule produces.
pub fn previous_occurrence(rule: &AvailabilityRule, occurrence: NaiveDate) -> Option<NaiveDate> {
    let candidate = match rule.recurrence {
        RecurrenceKind::None => return None,
        RecurrenceKind::Daily => occurrence.checked_sub_days(Days::new(1))?,
        RecurrenceKind::Weekly => occurrence.checked_sub_days(Days::new(7))?,
        RecurrenceKind::Monthly => previous_month_with_day(occurrence, rule.anchor.day())?,
    };

    (candidate >= rule.anchor).then_some(candidate)
}

fn next_month_with_day(from: NaiveDate, day_of_month: u32) -> Option<NaiveDate> {
    let mut cursor = from.with_day(1)?;
    loop {
        cursor = cursor.checked_add_months(Months::new(1))?;
        if let Some(next) = cursor.with_day(day_of_month) {
            return Some(next);
        }
    }
}

fn previous_month_with_day(from: NaiveDate, day_of_month: u32) -> Option<NaiveDate> {
    let mut cursor = from.with_day(1)?;
    loop {
        cursor = cursor.checked_sub_months(Months::new(1))?;
        if let Some(previous) = cursor.with_day(day_of_month) {
            return Some(previous);
        }
    }
}

/// Plans the removal of occurrences relative to `from_date`. The target
/// must be a date the rule currently produces; single-shot rules only ever
/// deactivate.
pub fn plan_removal(
    rule: &AvailabilityRule,
    mode: RemovalMode,
    from_date: Option<NaiveDate>,
) -> Result<RuleEdit, ScheduleError> {
    if mode == RemovalMode::All {
        return Ok(RuleEdit::Deactivate);
    }

    let target = from_date.ok_or_else(|| {
        ScheduleError::Validation("a target occurrence date is required for this removal mode".into())
    })?;

    if !occurs_on(rule, target) {
        return Err(ScheduleError::Validation(format!(
            "{} is not an occurrence of this rule",
            target
        )));
    }

    if rule.recurrence == RecurrenceKind::None {
        // target == anchor at this point; a single-shot rule has nothing to
        // split.
        return Ok(RuleEdit::Deactivate);
    }

    match mode {
        RemovalMode::All => Ok(RuleEdit::Deactivate),
        RemovalMode::ThisOnly => plan_single_removal(rule, target),
        RemovalMode::ThisAndFollowing => {
            if target == rule.anchor {
                Ok(RuleEdit::Deactivate)
            } else {
                let head_end = day_before(target)?;
                Ok(RuleEdit::Truncate(head_end))
            }
        }
    }
}

fn plan_single_removal(rule: &AvailabilityRule, target: NaiveDate) -> Result<RuleEdit, ScheduleError> {
    if target == rule.anchor {
        return Ok(match next_occurrence_after(rule, target) {
            Some(next) => RuleEdit::AdvanceAnchor(next),
            // Removing the only remaining occurrence empties the rule.
            None => RuleEdit::Deactivate,
        });
    }

    if rule.recurrence_end == Some(target) {
        let previous = previous_occurrence(rule, target).ok_or_else(|| {
            ScheduleError::Validation(format!("no occurrence precedes {}", target))
        })?;
        return Ok(RuleEdit::RegressEnd(previous));
    }

    let head_end = day_before(target)?;
    Ok(match next_occurrence_after(rule, target) {
        Some(tail_anchor) => RuleEdit::Split {
            head_end,
            tail_anchor,
        },
        // The recurrence end falls between the target and the next step, so
        // there is no tail to keep.
        None => RuleEdit::Truncate(head_end),
    })
}

fn day_before(date: NaiveDate) -> Result<NaiveDate, ScheduleError> {
    date.pred_opt()
        .ok_or_else(|| ScheduleError::Validation(format!("no calendar day precedes {}", date)))
}
