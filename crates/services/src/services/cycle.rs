//! Cycle calculator: maps a recurrence frequency and a reference date to a
//! canonical cycle identifier and a due date. Pure and total; all callers
//! pass `today` in.
//!
//! Cycle ids are plain strings chosen so that, per frequency, string order
//! equals chronological order: `YYYY-MM-DD` (daily), `YYYY-Www` with a
//! zero-padded ISO week (weekly), `YYYY-MM` (monthly).

use chrono::{Datelike, NaiveDate};
use db::models::chore::{ChoreTemplate, RecurrenceFrequency, RecurrenceRule};

pub fn cycle_id_for(date: NaiveDate, frequency: RecurrenceFrequency) -> String {
    match frequency {
        RecurrenceFrequency::Daily => date.format("%Y-%m-%d").to_string(),
        RecurrenceFrequency::Weekly => {
            let iso = date.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        RecurrenceFrequency::Monthly => date.format("%Y-%m").to_string(),
    }
}

pub fn current_cycle_id(frequency: RecurrenceFrequency, today: NaiveDate) -> String {
    cycle_id_for(today, frequency)
}

/// Due date for the instance a template would materialize today, or `None`
/// when the rule's end date rejects the cycle. A template that has never
/// been materialized uses its explicit due date exactly once.
pub fn due_date_for(template: &ChoreTemplate, today: NaiveDate) -> Option<NaiveDate> {
    let rule = template.recurrence.as_ref()?;

    let due = if template.last_cycle_id.is_none() {
        match template.due_date {
            Some(explicit) => explicit,
            None => computed_due(rule, today)?,
        }
    } else {
        computed_due(rule, today)?
    };

    if let Some(end) = rule.end_date {
        if end < due {
            return None;
        }
    }
    Some(due)
}

fn computed_due(rule: &RecurrenceRule, today: NaiveDate) -> Option<NaiveDate> {
    match rule.frequency {
        RecurrenceFrequency::Daily => Some(today),
        RecurrenceFrequency::Weekly => Some(upcoming_sunday(today)),
        RecurrenceFrequency::Monthly => monthly_due(today, rule.day_of_month),
    }
}

/// Today if today is Sunday, otherwise the next Sunday.
fn upcoming_sunday(today: NaiveDate) -> NaiveDate {
    let offset = (7 - today.weekday().num_days_from_sunday()) % 7;
    today + chrono::Duration::days(i64::from(offset))
}

/// The configured day clamped to the month's length; rolls to next month
/// once the day has passed. No day configured means the last day of the
/// month.
fn monthly_due(today: NaiveDate, day_of_month: Option<u32>) -> Option<NaiveDate> {
    let target = day_of_month.unwrap_or(31).clamp(1, 31);
    let this_month = clamped_date(today.year(), today.month(), target)?;
    if this_month >= today {
        return Some(this_month);
    }
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    clamped_date(year, month, target)
}

/// The requested day, or the closest earlier day that exists in the month.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::chore::Subtask;
    use uuid::Uuid;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(rule: RecurrenceRule) -> ChoreTemplate {
        ChoreTemplate {
            id: Uuid::new_v4(),
            title: "water plants".into(),
            description: None,
            assignee_ids: vec!["kid-a".into()],
            created_by: "parent".into(),
            points: 10,
            due_date: None,
            recurrence: Some(rule),
            subtasks: Vec::<Subtask>::new(),
            requires_photo: false,
            last_cycle_id: None,
            last_due_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn daily_cycle_id_is_the_date() {
        assert_eq!(
            cycle_id_for(date(2025, 6, 1), RecurrenceFrequency::Daily),
            "2025-06-01"
        );
    }

    #[test]
    fn weekly_cycle_ids_sort_chronologically() {
        let a = cycle_id_for(date(2025, 1, 6), RecurrenceFrequency::Weekly);
        let b = cycle_id_for(date(2025, 1, 13), RecurrenceFrequency::Weekly);
        assert_eq!(a, "2025-W02");
        assert_eq!(b, "2025-W03");
        assert!(a < b);
    }

    #[test]
    fn weekly_cycle_id_uses_iso_week_year() {
        // 2024-12-30 is a Monday belonging to ISO week 1 of 2025.
        assert_eq!(
            cycle_id_for(date(2024, 12, 30), RecurrenceFrequency::Weekly),
            "2025-W01"
        );
    }

    #[test]
    fn monthly_cycle_id_is_year_month() {
        assert_eq!(
            cycle_id_for(date(2025, 6, 15), RecurrenceFrequency::Monthly),
            "2025-06"
        );
    }

    #[test]
    fn daily_due_is_today() {
        let t = template(RecurrenceRule::daily());
        assert_eq!(due_date_for(&t, date(2025, 6, 1)), Some(date(2025, 6, 1)));
    }

    #[test]
    fn weekly_due_is_upcoming_sunday() {
        let t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Weekly,
            weekdays: None,
            day_of_month: None,
            end_date: None,
        });
        // 2025-06-02 is a Monday; the following Sunday is 2025-06-08.
        assert_eq!(due_date_for(&t, date(2025, 6, 2)), Some(date(2025, 6, 8)));
        // A Sunday is due the same day.
        assert_eq!(due_date_for(&t, date(2025, 6, 8)), Some(date(2025, 6, 8)));
    }

    #[test]
    fn monthly_due_clamps_day_31_in_a_30_day_month() {
        let t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Monthly,
            weekdays: None,
            day_of_month: Some(31),
            end_date: None,
        });
        assert_eq!(due_date_for(&t, date(2025, 6, 10)), Some(date(2025, 6, 30)));
    }

    #[test]
    fn monthly_due_rolls_to_next_month_when_day_has_passed() {
        let t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Monthly,
            weekdays: None,
            day_of_month: Some(5),
            end_date: None,
        });
        assert_eq!(due_date_for(&t, date(2025, 6, 10)), Some(date(2025, 7, 5)));
    }

    #[test]
    fn monthly_due_rolls_across_the_year_boundary() {
        let t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Monthly,
            weekdays: None,
            day_of_month: Some(1),
            end_date: None,
        });
        assert_eq!(due_date_for(&t, date(2025, 12, 15)), Some(date(2026, 1, 1)));
    }

    #[test]
    fn monthly_default_is_last_day_of_month() {
        let t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Monthly,
            weekdays: None,
            day_of_month: None,
            end_date: None,
        });
        assert_eq!(due_date_for(&t, date(2025, 2, 10)), Some(date(2025, 2, 28)));
        assert_eq!(due_date_for(&t, date(2024, 2, 10)), Some(date(2024, 2, 29)));
    }

    #[test]
    fn explicit_due_date_wins_only_before_first_materialization() {
        let mut t = template(RecurrenceRule::daily());
        t.due_date = Some(date(2025, 6, 15));

        assert_eq!(due_date_for(&t, date(2025, 6, 1)), Some(date(2025, 6, 15)));

        t.last_cycle_id = Some("2025-06-15".into());
        assert_eq!(due_date_for(&t, date(2025, 6, 16)), Some(date(2025, 6, 16)));
    }

    #[test]
    fn end_date_before_due_yields_none() {
        let mut t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Daily,
            weekdays: None,
            day_of_month: None,
            end_date: Some(date(2025, 5, 31)),
        });
        t.last_cycle_id = Some("2025-05-31".into());
        assert_eq!(due_date_for(&t, date(2025, 6, 1)), None);
    }

    #[test]
    fn end_date_on_the_due_date_still_produces_it() {
        let mut t = template(RecurrenceRule {
            frequency: RecurrenceFrequency::Daily,
            weekdays: None,
            day_of_month: None,
            end_date: Some(date(2025, 6, 1)),
        });
        t.last_cycle_id = Some("2025-05-31".into());
        assert_eq!(due_date_for(&t, date(2025, 6, 1)), Some(date(2025, 6, 1)));
    }

    #[test]
    fn no_recurrence_rule_means_no_due_date() {
        let mut t = template(RecurrenceRule::daily());
        t.recurrence = None;
        assert_eq!(due_date_for(&t, date(2025, 6, 1)), None);
    }
}
