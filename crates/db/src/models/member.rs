use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::sync::SyncMetadata;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FamilyRole {
    Coordinator,
    #[default]
    Member,
}

/// A member of the family. Ids are issued by the account system, which is
/// not managed here.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct FamilyMember {
    pub id: String,
    pub name: String,
    pub role: FamilyRole,
    pub points_balance: i64,
    pub lifetime_completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct FamilySettings {
    pub point_multiplier: f64,
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            point_multiplier: 1.0,
        }
    }
}

/// The `members` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct MembersDocument {
    pub members: Vec<FamilyMember>,
    #[serde(default)]
    pub settings: FamilySettings,
    pub metadata: SyncMetadata,
}

impl MembersDocument {
    pub fn member_mut(&mut self, member_id: &str) -> Option<&mut FamilyMember> {
        self.members.iter_mut().find(|m| m.id == member_id)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Earn,
}

/// Immutable ledger entry written when a verified chore posts points.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub member_id: String,
    pub chore_id: Uuid,
    pub kind: TransactionKind,
    pub points: i64,
    pub multiplier: f64,
    pub created_at: DateTime<Utc>,
}

/// The `transactions` document: append-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct LedgerDocument {
    pub transactions: Vec<PointsTransaction>,
    pub metadata: SyncMetadata,
}
