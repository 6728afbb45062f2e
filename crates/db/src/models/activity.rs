use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::member::FamilyRole;
use super::sync::SyncMetadata;

/// The activity document keeps this many entries; older ones are dropped
/// at append time.
pub const ACTIVITY_CAP: usize = 1000;

pub const SYSTEM_ACTOR_ID: &str = "system";
pub const SYSTEM_ACTOR_NAME: &str = "Choreboard";

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorRole {
    Coordinator,
    Member,
    System,
}

impl From<FamilyRole> for ActorRole {
    fn from(role: FamilyRole) -> Self {
        match role {
            FamilyRole::Coordinator => ActorRole::Coordinator,
            FamilyRole::Member => ActorRole::Member,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityAction {
    ChoreCreated,
    ChoreUpdated,
    ChoreCompleted,
    ChoreVerified,
    ChoreRejected,
    ChoreDeleted,
    ChoreExpired,
    TemplateCreated,
    TemplateDeleted,
    PointsAwarded,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_role: ActorRole,
    pub action_type: ActivityAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ActivityEntry {
    /// An entry attributed to the reconciler rather than a person.
    pub fn system(action: ActivityAction, details: String, reference_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: SYSTEM_ACTOR_ID.to_string(),
            actor_name: SYSTEM_ACTOR_NAME.to_string(),
            actor_role: ActorRole::System,
            action_type: action,
            target_user_id: None,
            details,
            reference_id,
            reference_type: Some("chore".to_string()),
            metadata: None,
        }
    }
}

/// The `activity` document: append-only, newest last, capped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ActivityDocument {
    pub entries: Vec<ActivityEntry>,
    pub metadata: SyncMetadata,
}

impl ActivityDocument {
    pub fn append(&mut self, entry: ActivityEntry) {
        self.entries.push(entry);
        if self.entries.len() > ACTIVITY_CAP {
            let drop = self.entries.len() - ACTIVITY_CAP;
            self.entries.drain(..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_caps_at_limit_dropping_oldest() {
        let mut doc = ActivityDocument::default();
        for i in 0..(ACTIVITY_CAP + 5) {
            doc.append(ActivityEntry::system(
                ActivityAction::ChoreCreated,
                format!("entry {i}"),
                None,
            ));
        }
        assert_eq!(doc.entries.len(), ACTIVITY_CAP);
        assert_eq!(doc.entries[0].details, "entry 5");
        assert_eq!(doc.entries.last().unwrap().details, format!("entry {}", ACTIVITY_CAP + 4));
    }
}
