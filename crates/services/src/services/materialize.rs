//! Instance factory: expands a template into a concrete, dated instance
//! for the cycle `today` falls in. No side effects; the caller persists.

use chrono::{NaiveDate, Utc};
use db::models::chore::{ChoreInstance, ChoreStatus, ChoreTemplate, SubtaskState};
use uuid::Uuid;

use super::cycle;

/// `None` when the template has no recurrence rule or its end date rejects
/// the cycle.
pub fn materialize(template: &ChoreTemplate, today: NaiveDate) -> Option<ChoreInstance> {
    let rule = template.recurrence.as_ref()?;
    let due_date = cycle::due_date_for(template, today)?;

    Some(ChoreInstance {
        id: Uuid::new_v4(),
        template_id: Some(template.id),
        cycle_id: Some(cycle::cycle_id_for(today, rule.frequency)),
        title: template.title.clone(),
        description: template.description.clone(),
        assignee_ids: template.assignee_ids.clone(),
        points: template.points,
        due_date,
        subtasks: template.subtasks.iter().map(SubtaskState::fresh).collect(),
        status: ChoreStatus::Pending,
        completed_by: None,
        completed_at: None,
        verified_by: None,
        verified_at: None,
        photo_ref: None,
        requires_photo: template.requires_photo,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use db::models::chore::{RecurrenceFrequency, RecurrenceRule, Subtask};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template() -> ChoreTemplate {
        ChoreTemplate {
            id: Uuid::new_v4(),
            title: "take out trash".into(),
            description: Some("all bins".into()),
            assignee_ids: vec!["kid-a".into(), "kid-b".into()],
            created_by: "parent".into(),
            points: 15,
            due_date: None,
            recurrence: Some(RecurrenceRule::daily()),
            subtasks: vec![
                Subtask {
                    id: Uuid::new_v4(),
                    title: "kitchen".into(),
                },
                Subtask {
                    id: Uuid::new_v4(),
                    title: "bathroom".into(),
                },
            ],
            requires_photo: true,
            last_cycle_id: None,
            last_due_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn copies_definition_and_resets_state() {
        let t = template();
        let instance = materialize(&t, date(2025, 6, 1)).unwrap();

        assert_eq!(instance.template_id, Some(t.id));
        assert_eq!(instance.cycle_id.as_deref(), Some("2025-06-01"));
        assert_eq!(instance.due_date, date(2025, 6, 1));
        assert_eq!(instance.title, t.title);
        assert_eq!(instance.points, 15);
        assert_eq!(instance.assignee_ids, t.assignee_ids);
        assert_eq!(instance.status, ChoreStatus::Pending);
        assert!(instance.requires_photo);
        assert_eq!(instance.subtasks.len(), 2);
        assert!(instance.subtasks.iter().all(|s| !s.done));
        assert!(instance.completed_by.is_none());
        assert!(instance.photo_ref.is_none());
    }

    #[test]
    fn each_materialization_gets_a_fresh_id() {
        let t = template();
        let a = materialize(&t, date(2025, 6, 1)).unwrap();
        let b = materialize(&t, date(2025, 6, 1)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn end_date_in_the_past_rejects_the_cycle() {
        let mut t = template();
        t.last_cycle_id = Some("2025-05-30".into());
        if let Some(rule) = t.recurrence.as_mut() {
            rule.end_date = Some(date(2025, 5, 31));
        }
        assert!(materialize(&t, date(2025, 6, 1)).is_none());
    }

    #[test]
    fn weekly_instance_lands_on_sunday_with_week_cycle() {
        let mut t = template();
        t.recurrence = Some(RecurrenceRule {
            frequency: RecurrenceFrequency::Weekly,
            weekdays: Some(vec![6, 7]),
            day_of_month: None,
            end_date: None,
        });
        // 2025-06-02 is a Monday in ISO week 23.
        let instance = materialize(&t, date(2025, 6, 2)).unwrap();
        assert_eq!(instance.cycle_id.as_deref(), Some("2025-W23"));
        assert_eq!(instance.due_date, date(2025, 6, 8));
    }

    #[test]
    fn no_rule_means_no_instance() {
        let mut t = template();
        t.recurrence = None;
        assert!(materialize(&t, date(2025, 6, 1)).is_none());
    }
}
