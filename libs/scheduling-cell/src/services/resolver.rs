// libs/scheduling-cell/src/services/resolver.rs
//
// Merges the legacy weekly-template windows and the date-anchored rule
// windows into concrete slot lists. Pure over the supplied rule sets; the
// caller is responsible for provider validation and data fetching.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use std::collections::BTreeSet;

use shared_models::{AvailabilityRule, BlackoutDate, WeeklyTemplate};

use crate::models::DayAvailability;
use crate::services::recurrence;

/// Slot-start cadence inside an availability window.
pub const SLOT_STEP_MINUTES: u32 = 30;

/// Day-of-week as stored on weekly templates: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Every `[start, end)` window contributed for `date`, across both rule
/// systems. Both sources reduce to the same shape here, so the merge treats
/// them uniformly.
fn windows_for(
    date: NaiveDate,
    templates: &[WeeklyTemplate],
    rules: &[AvailabilityRule],
) -> Vec<(NaiveTime, NaiveTime)> {
    let weekday = day_of_week(date);
    let mut windows = Vec::new();

    for template in templates {
        if template.day_of_week == weekday {
            windows.push((template.start_time, template.end_time));
        }
    }

    for rule in rules {
        if rule.is_active && recurrence::occurs_on(rule, date) {
            windows.push((rule.start_time, rule.end_time));
        }
    }

    windows
}

/// Resolves the concrete slot list for one date. A blackout voids every
/// window the date would otherwise have. Overlapping windows from the two
/// rule systems describe the same calendar, so their slots deduplicate
/// through the ordered set rather than erroring.
pub fn resolve_day(
    date: NaiveDate,
    templates: &[WeeklyTemplate],
    rules: &[AvailabilityRule],
    blackouts: &[BlackoutDate],
) -> DayAvailability {
    if blackouts.iter().any(|b| b.date == date) {
        return DayAvailability {
            available: false,
            slots: Vec::new(),
        };
    }

    let mut slots = BTreeSet::new();
    for (start, end) in windows_for(date, templates, rules) {
        let step = SLOT_STEP_MINUTES * 60;
        let end_secs = end.num_seconds_from_midnight();
        let mut cursor = start.num_seconds_from_midnight();

        // Slot starts run from the window start inclusive to its end
        // exclusive.
        while cursor < end_secs {
            if let Some(slot) = NaiveTime::from_num_seconds_from_midnight_opt(cursor, 0) {
                slots.insert(slot);
            }
            cursor += step;
        }
    }

    DayAvailability {
        available: !slots.is_empty(),
        slots: slots.into_iter().collect(),
    }
}

/// Half-open containment check: does `time` fall inside some `[start, end)`
/// window on `date`? Blackouts are screened separately by callers.
pub fn covers(
    date: NaiveDate,
    time: NaiveTime,
    templates: &[WeeklyTemplate],
    rules: &[AvailabilityRule],
) -> bool {
    windows_for(date, templates, rules)
        .iter()
        .any(|(start, end)| time >= *start && time < *end)
}
