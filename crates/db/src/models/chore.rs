use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::sync::SyncMetadata;

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "chore_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChoreStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Verified,
    Overdue,
}

impl ChoreStatus {
    /// Completed and verified instances are history; everything else is live.
    pub fn is_open(&self) -> bool {
        !matches!(self, ChoreStatus::Completed | ChoreStatus::Verified)
    }
}

/// Wire spelling matches the documents written by earlier clients.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    /// 1 = Monday .. 7 = Sunday. Weekly templates only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<Vec<u8>>,
    /// Monthly templates only; defaults to the last day of the month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn daily() -> Self {
        Self {
            frequency: RecurrenceFrequency::Daily,
            weekdays: None,
            day_of_month: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct SubtaskState {
    pub id: Uuid,
    pub title: String,
    pub done: bool,
}

impl SubtaskState {
    /// A fresh, unchecked copy of a template subtask.
    pub fn fresh(subtask: &Subtask) -> Self {
        Self {
            id: subtask.id,
            title: subtask.title.clone(),
            done: false,
        }
    }
}

/// Declarative definition of a recurring chore. Definition fields belong to
/// the coordinator; `last_cycle_id`/`last_due_date` belong to the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChoreTemplate {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<String>,
    pub created_by: String,
    pub points: u32,
    /// Explicit due date, honored only for the very first instance.
    pub due_date: Option<NaiveDate>,
    pub recurrence: Option<RecurrenceRule>,
    pub subtasks: Vec<Subtask>,
    pub requires_photo: bool,
    pub last_cycle_id: Option<String>,
    pub last_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// One concrete, dated occurrence of a template, or a one-off chore.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChoreInstance {
    pub id: Uuid,
    pub template_id: Option<Uuid>,
    pub cycle_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<String>,
    pub points: u32,
    pub due_date: NaiveDate,
    pub subtasks: Vec<SubtaskState>,
    pub status: ChoreStatus,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub photo_ref: Option<String>,
    pub requires_photo: bool,
    pub created_at: DateTime<Utc>,
}

impl ChoreInstance {
    /// Past due and never finished. Expired instances are retired by the
    /// next reconciliation pass; finished ones are kept as history.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.due_date < today && self.status.is_open()
    }

    pub fn is_for_cycle(&self, template_id: Uuid, cycle_id: &str) -> bool {
        self.template_id == Some(template_id) && self.cycle_id.as_deref() == Some(cycle_id)
    }

    /// Clear everything a rejected completion left behind.
    pub fn reset_to_pending(&mut self) {
        self.status = ChoreStatus::Pending;
        self.completed_by = None;
        self.completed_at = None;
        self.verified_by = None;
        self.verified_at = None;
        self.photo_ref = None;
        for subtask in &mut self.subtasks {
            subtask.done = false;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateChore {
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<String>,
    pub points: u32,
    pub due_date: NaiveDate,
    pub subtasks: Option<Vec<String>>,
    pub requires_photo: Option<bool>,
    pub created_by: String,
}

impl CreateChore {
    /// Build a one-off instance (no template, no cycle).
    pub fn into_instance(self) -> ChoreInstance {
        ChoreInstance {
            id: Uuid::new_v4(),
            template_id: None,
            cycle_id: None,
            title: self.title,
            description: self.description,
            assignee_ids: self.assignee_ids,
            points: self.points,
            due_date: self.due_date,
            subtasks: self
                .subtasks
                .unwrap_or_default()
                .into_iter()
                .map(|title| SubtaskState {
                    id: Uuid::new_v4(),
                    title,
                    done: false,
                })
                .collect(),
            status: ChoreStatus::Pending,
            completed_by: None,
            completed_at: None,
            verified_by: None,
            verified_at: None,
            photo_ref: None,
            requires_photo: self.requires_photo.unwrap_or(false),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateChore {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_ids: Option<Vec<String>>,
    pub points: Option<u32>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<ChoreStatus>,
    pub subtasks: Option<Vec<SubtaskState>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTemplate {
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<String>,
    pub created_by: String,
    pub points: u32,
    pub due_date: Option<NaiveDate>,
    pub recurrence: Option<RecurrenceRule>,
    pub subtasks: Option<Vec<String>>,
    pub requires_photo: Option<bool>,
}

impl CreateTemplate {
    pub fn into_template(self) -> ChoreTemplate {
        ChoreTemplate {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            assignee_ids: self.assignee_ids,
            created_by: self.created_by,
            points: self.points,
            due_date: self.due_date,
            recurrence: self.recurrence,
            subtasks: self
                .subtasks
                .unwrap_or_default()
                .into_iter()
                .map(|title| Subtask {
                    id: Uuid::new_v4(),
                    title,
                })
                .collect(),
            requires_photo: self.requires_photo.unwrap_or(false),
            last_cycle_id: None,
            last_due_date: None,
            created_at: Utc::now(),
        }
    }
}

/// The `templates` document: complete, replace-on-write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct TemplatesDocument {
    pub templates: Vec<ChoreTemplate>,
    pub metadata: SyncMetadata,
}

/// The `chores` document. The field is named `chores` on the wire for
/// compatibility with documents written by earlier clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ChoresDocument {
    pub chores: Vec<ChoreInstance>,
    pub metadata: SyncMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(status: ChoreStatus, due: NaiveDate) -> ChoreInstance {
        let mut chore = CreateChore {
            title: "dishes".into(),
            description: None,
            assignee_ids: vec!["m1".into()],
            points: 5,
            due_date: due,
            subtasks: None,
            requires_photo: None,
            created_by: "p1".into(),
        }
        .into_instance();
        chore.status = status;
        chore
    }

    #[test]
    fn expired_means_past_due_and_open() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        assert!(instance(ChoreStatus::Pending, yesterday).is_expired(today));
        assert!(instance(ChoreStatus::InProgress, yesterday).is_expired(today));
        assert!(!instance(ChoreStatus::Completed, yesterday).is_expired(today));
        assert!(!instance(ChoreStatus::Verified, yesterday).is_expired(today));
        assert!(!instance(ChoreStatus::Pending, today).is_expired(today));
    }

    #[test]
    fn reset_clears_completion_state() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let mut chore = instance(ChoreStatus::Completed, today);
        chore.completed_by = Some("m1".into());
        chore.completed_at = Some(Utc::now());
        chore.photo_ref = Some("photos/1.jpg".into());
        chore.subtasks.push(SubtaskState {
            id: Uuid::new_v4(),
            title: "rinse".into(),
            done: true,
        });

        chore.reset_to_pending();

        assert_eq!(chore.status, ChoreStatus::Pending);
        assert!(chore.completed_by.is_none());
        assert!(chore.completed_at.is_none());
        assert!(chore.photo_ref.is_none());
        assert!(chore.subtasks.iter().all(|s| !s.done));
    }

    #[test]
    fn frequency_uses_wire_spelling() {
        let json = serde_json::to_string(&RecurrenceFrequency::Weekly).unwrap();
        assert_eq!(json, "\"WEEKLY\"");
        let back: RecurrenceFrequency = serde_json::from_str("\"MONTHLY\"").unwrap();
        assert_eq!(back, RecurrenceFrequency::Monthly);
    }

    #[test]
    fn chores_document_keeps_legacy_field_name() {
        let doc = ChoresDocument::default();
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("chores").is_some());
    }
}
