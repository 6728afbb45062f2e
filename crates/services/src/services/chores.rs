//! Mutation facade: every write the presentation layer can request.
//!
//! The remote store has no partial update, so each mutation is a
//! whole-document read-modify-write over the direct transport, with the
//! matching coarse gateway action as fallback. There is no version check on
//! the write: a stale read written back clobbers a concurrent writer (last
//! writer wins). The local cache is refreshed only after the remote write
//! is confirmed.

use std::sync::Arc;

use chrono::Utc;
use db::models::activity::{ActivityAction, ActivityEntry, ActorRole};
use db::models::chore::{
    ChoreInstance, ChoreStatus, ChoreTemplate, ChoresDocument, CreateChore, CreateTemplate,
    UpdateChore,
};
use db::models::member::{PointsTransaction, TransactionKind};
use remote::{RemoteError, RemoteStore, store::DOC_CHORES};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::cache_sync::{CacheSyncError, CacheSyncService};
use super::materialize::materialize;
use super::reconcile::ReconcileService;

#[derive(Debug, Error)]
pub enum ChoreServiceError {
    #[error("chore not found: {0}")]
    NotFound(Uuid),
    #[error("template not found: {0}")]
    TemplateNotFound(Uuid),
    #[error("chore is {status}, cannot {action}")]
    InvalidStatus {
        status: ChoreStatus,
        action: &'static str,
    },
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("cache sync error: {0}")]
    CacheSync(#[from] CacheSyncError),
}

/// Points posted for a verified chore: base value times the family
/// multiplier, ties rounded away from zero (in the member's favor).
pub fn award_for(points: u32, multiplier: f64) -> i64 {
    (f64::from(points) * multiplier).round() as i64
}

fn find_mut(doc: &mut ChoresDocument, id: Uuid) -> Result<&mut ChoreInstance, ChoreServiceError> {
    doc.chores
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(ChoreServiceError::NotFound(id))
}

fn update_in(
    doc: &mut ChoresDocument,
    id: Uuid,
    patch: &UpdateChore,
) -> Result<ChoreInstance, ChoreServiceError> {
    let chore = find_mut(doc, id)?;
    if let Some(title) = &patch.title {
        chore.title = title.clone();
    }
    if let Some(description) = &patch.description {
        chore.description = Some(description.clone());
    }
    if let Some(assignees) = &patch.assignee_ids {
        chore.assignee_ids = assignees.clone();
    }
    if let Some(points) = patch.points {
        chore.points = points;
    }
    if let Some(due_date) = patch.due_date {
        chore.due_date = due_date;
    }
    if let Some(status) = &patch.status {
        chore.status = status.clone();
    }
    if let Some(subtasks) = &patch.subtasks {
        chore.subtasks = subtasks.clone();
    }
    Ok(chore.clone())
}

fn delete_in(doc: &mut ChoresDocument, id: Uuid) -> Result<ChoreInstance, ChoreServiceError> {
    let index = doc
        .chores
        .iter()
        .position(|c| c.id == id)
        .ok_or(ChoreServiceError::NotFound(id))?;
    Ok(doc.chores.remove(index))
}

fn complete_in(
    doc: &mut ChoresDocument,
    id: Uuid,
    actor_id: &str,
    photo_ref: Option<&str>,
) -> Result<ChoreInstance, ChoreServiceError> {
    let chore = find_mut(doc, id)?;
    if !matches!(chore.status, ChoreStatus::Pending | ChoreStatus::InProgress) {
        return Err(ChoreServiceError::InvalidStatus {
            status: chore.status.clone(),
            action: "complete",
        });
    }
    chore.status = ChoreStatus::Completed;
    chore.completed_by = Some(actor_id.to_string());
    chore.completed_at = Some(Utc::now());
    if let Some(photo) = photo_ref {
        chore.photo_ref = Some(photo.to_string());
    }
    Ok(chore.clone())
}

fn verify_in(
    doc: &mut ChoresDocument,
    id: Uuid,
    verifier_id: &str,
    approved: bool,
) -> Result<ChoreInstance, ChoreServiceError> {
    let chore = find_mut(doc, id)?;
    if chore.status != ChoreStatus::Completed {
        return Err(ChoreServiceError::InvalidStatus {
            status: chore.status.clone(),
            action: "verify",
        });
    }
    if approved {
        chore.status = ChoreStatus::Verified;
        chore.verified_by = Some(verifier_id.to_string());
        chore.verified_at = Some(Utc::now());
    } else {
        chore.reset_to_pending();
    }
    Ok(chore.clone())
}

pub struct ChoreService {
    remote: Arc<RemoteStore>,
    cache_sync: CacheSyncService,
    reconciler: Arc<ReconcileService>,
}

impl ChoreService {
    pub fn new(
        remote: Arc<RemoteStore>,
        cache_sync: CacheSyncService,
        reconciler: Arc<ReconcileService>,
    ) -> Self {
        Self {
            remote,
            cache_sync,
            reconciler,
        }
    }

    /// One read-modify-write of the chores document via the direct
    /// transport, with the per-operation gateway action as fallback.
    /// Returns the mutated instance when the direct path served the call;
    /// the gateway applies the mutation server-side and returns nothing.
    async fn with_chores<T>(
        &self,
        op: &'static str,
        mutate: impl Fn(&mut ChoresDocument) -> Result<T, ChoreServiceError>,
        gateway: impl AsyncFnOnce() -> Result<(), RemoteError>,
    ) -> Result<Option<T>, ChoreServiceError> {
        let routed = self
            .remote
            .run(
                op,
                async |token| {
                    let direct = self.remote.direct();
                    let raw = direct.read_document(&token, DOC_CHORES).await?;
                    let mut doc: ChoresDocument = parse_or_default(raw, DOC_CHORES);
                    match mutate(&mut doc) {
                        Ok(outcome) => {
                            doc.metadata.touch();
                            let body = serde_json::to_value(&doc)
                                .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                            direct.write_document(&token, DOC_CHORES, &body).await?;
                            Ok(Ok(Some(outcome)))
                        }
                        Err(rejected) => Ok(Err(rejected)),
                    }
                },
                async || {
                    gateway().await?;
                    Ok(Ok(None))
                },
            )
            .await?;
        routed.value
    }

    pub async fn create_chore(&self, data: CreateChore) -> Result<ChoreInstance, ChoreServiceError> {
        let created_by = data.created_by.clone();
        let instance = data.into_instance();
        let for_gateway = instance.clone();

        self.with_chores(
            "create chore",
            |doc| {
                doc.chores.push(instance.clone());
                Ok(())
            },
            async || self.remote.gateway().create_chore(&for_gateway).await,
        )
        .await?;

        info!(chore_id = %instance.id, title = %instance.title, "chore created");
        self.log_activity(user_entry(
            ActivityAction::ChoreCreated,
            &created_by,
            ActorRole::Member,
            format!("Created '{}' (due {})", instance.title, instance.due_date),
            Some(instance.id.to_string()),
        ))
        .await;
        self.after_mutation().await;
        Ok(instance)
    }

    pub async fn update_chore(
        &self,
        id: Uuid,
        patch: UpdateChore,
    ) -> Result<(), ChoreServiceError> {
        self.with_chores(
            "update chore",
            |doc| update_in(doc, id, &patch),
            async || self.remote.gateway().update_chore(id, &patch).await,
        )
        .await?;

        info!(chore_id = %id, "chore updated");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn delete_chore(&self, id: Uuid, actor_id: &str) -> Result<(), ChoreServiceError> {
        let removed = self
            .with_chores(
                "delete chore",
                |doc| delete_in(doc, id),
                async || self.remote.gateway().delete_chore(id).await,
            )
            .await?;

        info!(chore_id = %id, "chore deleted");
        if let Some(chore) = removed {
            self.log_activity(user_entry(
                ActivityAction::ChoreDeleted,
                actor_id,
                ActorRole::Member,
                format!("Deleted '{}'", chore.title),
                Some(id.to_string()),
            ))
            .await;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn complete_chore(
        &self,
        id: Uuid,
        actor_id: &str,
        photo_ref: Option<&str>,
    ) -> Result<(), ChoreServiceError> {
        let completed = self
            .with_chores(
                "complete chore",
                |doc| complete_in(doc, id, actor_id, photo_ref),
                async || self.remote.gateway().complete_chore(id, actor_id, photo_ref).await,
            )
            .await?;

        info!(chore_id = %id, actor_id, "chore completed");
        if let Some(chore) = completed {
            self.log_activity(user_entry(
                ActivityAction::ChoreCompleted,
                actor_id,
                ActorRole::Member,
                format!("Completed '{}'", chore.title),
                Some(id.to_string()),
            ))
            .await;
        }
        self.after_mutation().await;
        Ok(())
    }

    /// Approval verifies and posts points; rejection returns the chore to
    /// pending for resubmission. The point award is a best-effort secondary
    /// effect: its failure never rolls the verification back.
    pub async fn verify_chore(
        &self,
        id: Uuid,
        verifier_id: &str,
        approved: bool,
    ) -> Result<(), ChoreServiceError> {
        let verified = self
            .with_chores(
                "verify chore",
                |doc| verify_in(doc, id, verifier_id, approved),
                async || self.remote.gateway().verify_chore(id, verifier_id, approved).await,
            )
            .await?;

        info!(chore_id = %id, verifier_id, approved, "chore verified");
        if let Some(chore) = verified {
            let action = if approved {
                ActivityAction::ChoreVerified
            } else {
                ActivityAction::ChoreRejected
            };
            let details = if approved {
                format!("Approved '{}'", chore.title)
            } else {
                format!("Sent '{}' back for rework", chore.title)
            };
            self.log_activity(user_entry(
                action,
                verifier_id,
                ActorRole::Coordinator,
                details,
                Some(id.to_string()),
            ))
            .await;

            if approved {
                self.award_points(&chore).await;
            }
        }
        self.after_mutation().await;
        Ok(())
    }

    /// Templates are created over the direct path only; the gateway has no
    /// matching action. The first instance is materialized here, not by the
    /// reconciler: a template with no recorded cycle is never backfilled.
    pub async fn create_template(
        &self,
        data: CreateTemplate,
    ) -> Result<ChoreTemplate, ChoreServiceError> {
        let mut template = data.into_template();
        let today = Utc::now().date_naive();

        let mut templates_doc = self.remote.read_templates().await?.value;
        let mut chores_doc = self.remote.read_chores().await?.value;

        let first = materialize(&template, today);
        if let Some(instance) = &first {
            template.last_cycle_id = instance.cycle_id.clone();
            template.last_due_date = Some(instance.due_date);
        }

        templates_doc.templates.push(template.clone());
        templates_doc.metadata.touch();
        self.remote.write_templates(&templates_doc).await?;

        if let Some(instance) = first {
            info!(
                template_id = %template.id,
                chore_id = %instance.id,
                cycle = ?instance.cycle_id,
                "materialized first instance for new template"
            );
            chores_doc.chores.push(instance);
            chores_doc.metadata.touch();
            self.remote.write_chores(&chores_doc).await?;
        }

        self.log_activity(user_entry(
            ActivityAction::TemplateCreated,
            &template.created_by,
            ActorRole::Coordinator,
            format!("Created template '{}'", template.title),
            Some(template.id.to_string()),
        ))
        .await;
        self.after_mutation().await;
        Ok(template)
    }

    /// Removing a template also removes its live (pending or in-progress)
    /// instances; finished ones stay as history.
    pub async fn delete_template(
        &self,
        id: Uuid,
        actor_id: &str,
    ) -> Result<(), ChoreServiceError> {
        let routed = self
            .remote
            .run(
                "delete template",
                async |token| {
                    let direct = self.remote.direct();
                    let raw = direct
                        .read_document(&token, remote::store::DOC_TEMPLATES)
                        .await?;
                    let mut templates_doc: db::models::chore::TemplatesDocument =
                        parse_or_default(raw, remote::store::DOC_TEMPLATES);

                    let Some(index) = templates_doc.templates.iter().position(|t| t.id == id)
                    else {
                        return Ok(Err(ChoreServiceError::TemplateNotFound(id)));
                    };
                    let removed = templates_doc.templates.remove(index);

                    let raw = direct.read_document(&token, DOC_CHORES).await?;
                    let mut chores_doc: ChoresDocument = parse_or_default(raw, DOC_CHORES);
                    chores_doc
                        .chores
                        .retain(|c| !(c.template_id == Some(id) && c.status.is_open()));

                    chores_doc.metadata.touch();
                    let body = serde_json::to_value(&chores_doc)
                        .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                    direct.write_document(&token, DOC_CHORES, &body).await?;

                    templates_doc.metadata.touch();
                    let body = serde_json::to_value(&templates_doc)
                        .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                    direct
                        .write_document(&token, remote::store::DOC_TEMPLATES, &body)
                        .await?;
                    Ok(Ok(Some(removed)))
                },
                async || {
                    self.remote.gateway().delete_template(id).await?;
                    Ok(Ok(None))
                },
            )
            .await?;
        let removed = routed.value?;

        info!(template_id = %id, "template deleted");
        if let Some(template) = removed {
            self.log_activity(user_entry(
                ActivityAction::TemplateDeleted,
                actor_id,
                ActorRole::Coordinator,
                format!("Deleted template '{}' and its open chores", template.title),
                Some(id.to_string()),
            ))
            .await;
        }
        self.after_mutation().await;
        Ok(())
    }

    async fn award_points(&self, chore: &ChoreInstance) {
        if let Err(e) = self.try_award(chore).await {
            warn!(
                chore_id = %chore.id,
                error = %e,
                "point award failed; verification stands"
            );
        }
    }

    async fn try_award(&self, chore: &ChoreInstance) -> Result<(), ChoreServiceError> {
        let Some(member_id) = chore.completed_by.clone() else {
            warn!(chore_id = %chore.id, "verified chore has no completer, skipping award");
            return Ok(());
        };

        let mut members = self.remote.read_members().await?.value;
        let multiplier = members.settings.point_multiplier;
        let award = award_for(chore.points, multiplier);

        let Some(member) = members.member_mut(&member_id) else {
            warn!(member_id, chore_id = %chore.id, "unknown member, skipping award");
            return Ok(());
        };
        member.points_balance += award;
        member.lifetime_completed += 1;
        members.metadata.touch();
        self.remote.write_members(&members).await?;

        let mut ledger = self.remote.read_ledger().await?.value;
        ledger.transactions.push(PointsTransaction {
            id: Uuid::new_v4(),
            member_id: member_id.clone(),
            chore_id: chore.id,
            kind: TransactionKind::Earn,
            points: award,
            multiplier,
            created_at: Utc::now(),
        });
        ledger.metadata.touch();
        self.remote.write_ledger(&ledger).await?;

        info!(member_id, chore_id = %chore.id, award, "points awarded");
        let mut entry = ActivityEntry::system(
            ActivityAction::PointsAwarded,
            format!("Awarded {award} points for '{}'", chore.title),
            Some(chore.id.to_string()),
        );
        entry.target_user_id = Some(member_id);
        self.log_activity(entry).await;
        Ok(())
    }

    async fn log_activity(&self, entry: ActivityEntry) {
        if let Err(e) = self.remote.append_activity(vec![entry]).await {
            warn!(error = %e, "could not append to activity log");
        }
    }

    /// Cache refresh after the confirmed write, then a background
    /// reconciliation pass.
    async fn after_mutation(&self) {
        if let Err(e) = self.cache_sync.refresh_from_remote(&self.remote).await {
            warn!(error = %e, "cache refresh after mutation failed");
        }
        let reconciler = self.reconciler.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.run_once().await {
                warn!(error = %e, "post-mutation reconcile failed");
            }
        });
    }
}

fn user_entry(
    action: ActivityAction,
    actor_id: &str,
    actor_role: ActorRole,
    details: String,
    reference_id: Option<String>,
) -> ActivityEntry {
    ActivityEntry {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        actor_id: actor_id.to_string(),
        actor_name: actor_id.to_string(),
        actor_role,
        action_type: action,
        target_user_id: None,
        details,
        reference_id,
        reference_type: Some("chore".to_string()),
        metadata: None,
    }
}

fn parse_or_default<T: DeserializeOwned + Default>(
    raw: Option<serde_json::Value>,
    name: &'static str,
) -> T {
    match raw {
        Some(value) => match serde_json::from_value(value) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(document = name, error = %e, "malformed document, treating as empty");
                T::default()
            }
        },
        None => T::default(),
    }
}
