//! The reconciliation pass: retire expired chore instances and materialize
//! the current cycle's instances, exactly once per cycle.
//!
//! Planning is pure (`plan_for_template`, `expired_orphans`); the async
//! shell does whole-document reads and writes around it. A single-flight
//! guard drops overlapping triggers instead of queueing them: the periodic
//! timer re-runs the pass and produces the same result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use db::models::activity::{ActivityAction, ActivityEntry};
use db::models::chore::{ChoreInstance, ChoreTemplate};
use remote::{RemoteError, RemoteStore};
use serde::Serialize;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use super::cache_sync::{CacheSyncError, CacheSyncService};
use super::cycle;
use super::materialize::materialize;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("cache sync error: {0}")]
    CacheSync(#[from] CacheSyncError),
}

/// What a pass did, reported by the manual trigger route.
#[derive(Debug, Clone, Default, Serialize, TS)]
pub struct ReconcileOutcome {
    /// False when the trigger was dropped because a pass was in flight.
    pub started: bool,
    pub created: usize,
    pub removed: usize,
    /// The direct path had no usable credential; the gateway was asked to
    /// run the refresh server-side instead.
    pub redirected_to_gateway: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreateReason {
    /// The current cycle's instance was expired and removed this pass.
    ReplacedExpired,
    /// The template's last recorded cycle is strictly in the past.
    CatchUp,
}

impl CreateReason {
    fn describe(self) -> &'static str {
        match self {
            CreateReason::ReplacedExpired => "replacing expired instance",
            CreateReason::CatchUp => "catching up to current cycle",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TemplatePlan {
    pub expired: Vec<ChoreInstance>,
    pub create: Option<(ChoreInstance, CreateReason)>,
}

impl TemplatePlan {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.create.is_none()
    }
}

/// Decide what one template needs today. See the module doc for the rules;
/// the important negatives: a template that has never been materialized is
/// not backfilled, and a surviving current-cycle instance (completed or
/// not) blocks creation.
pub(crate) fn plan_for_template(
    template: &ChoreTemplate,
    instances: &[ChoreInstance],
    today: NaiveDate,
) -> TemplatePlan {
    let Some(rule) = template.recurrence.as_ref() else {
        return TemplatePlan::default();
    };
    let current = cycle::current_cycle_id(rule.frequency, today);

    let mine: Vec<&ChoreInstance> = instances
        .iter()
        .filter(|i| i.template_id == Some(template.id))
        .collect();

    let expired: Vec<ChoreInstance> = mine
        .iter()
        .filter(|i| i.is_expired(today))
        .map(|i| (*i).clone())
        .collect();

    let removed_current = expired
        .iter()
        .any(|i| i.cycle_id.as_deref() == Some(current.as_str()));

    let current_survives = mine
        .iter()
        .any(|i| !i.is_expired(today) && i.cycle_id.as_deref() == Some(current.as_str()));

    // "Fell behind" means a genuinely past cycle. A null last cycle is a
    // template that has never run; its first instance comes from explicit
    // creation, not from this pass.
    let fell_behind = template
        .last_cycle_id
        .as_deref()
        .is_some_and(|last| last < current.as_str());

    let reason = if current_survives {
        None
    } else if removed_current {
        Some(CreateReason::ReplacedExpired)
    } else if fell_behind {
        Some(CreateReason::CatchUp)
    } else {
        None
    };

    let create = reason.and_then(|reason| materialize(template, today).map(|i| (i, reason)));

    TemplatePlan { expired, create }
}

/// Expired instances that no longer reference a template (one-offs past
/// their due date, or instances written before the field existed). The
/// title match is for the log only; they are removed either way.
pub(crate) fn expired_orphans<'a>(
    instances: &'a [ChoreInstance],
    templates: &[ChoreTemplate],
    today: NaiveDate,
) -> Vec<(&'a ChoreInstance, Option<uuid::Uuid>)> {
    instances
        .iter()
        .filter(|i| i.template_id.is_none() && i.is_expired(today))
        .map(|i| {
            let matched = templates.iter().find(|t| t.title == i.title).map(|t| t.id);
            (i, matched)
        })
        .collect()
}

pub struct ReconcileService {
    remote: Arc<RemoteStore>,
    cache_sync: CacheSyncService,
    guard: tokio::sync::Mutex<()>,
}

impl ReconcileService {
    pub fn new(remote: Arc<RemoteStore>, cache_sync: CacheSyncService) -> Self {
        Self {
            remote,
            cache_sync,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Spawn the periodic background pass.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("starting reconcile service with interval {:?}", poll_interval);
            let mut interval = interval(poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("reconciliation pass failed: {}", e);
                }
            }
        })
    }

    /// Run one pass now, unless one is already in flight. Overlapping
    /// triggers are dropped, not queued.
    pub async fn run_once(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let Ok(_flight) = self.guard.try_lock() else {
            debug!("reconcile already in flight, dropping trigger");
            return Ok(ReconcileOutcome::default());
        };
        let today = Utc::now().date_naive();
        self.ensure_up_to_date(today).await
    }

    async fn ensure_up_to_date(&self, today: NaiveDate) -> Result<ReconcileOutcome, ReconcileError> {
        let templates_read = self.remote.read_templates().await?;
        let chores_read = self.remote.read_chores().await?;
        let members_read = self.remote.read_members().await?;

        // Without a usable credential this process cannot write documents;
        // hand the whole pass to the gateway and mirror what we could read.
        if templates_read.credentials_unavailable()
            || chores_read.credentials_unavailable()
            || members_read.credentials_unavailable()
        {
            return self
                .redirect_to_gateway(&templates_read.value.templates, &chores_read.value.chores)
                .await;
        }

        let mut templates_doc = templates_read.value;
        let mut chores_doc = chores_read.value;
        let member_ids: std::collections::HashSet<String> = members_read
            .value
            .members
            .iter()
            .map(|m| m.id.clone())
            .collect();

        let mut activity: Vec<ActivityEntry> = Vec::new();
        let mut templates_changed = false;
        let mut created = 0usize;
        let mut removed = 0usize;

        for template in &mut templates_doc.templates {
            let plan = plan_for_template(template, &chores_doc.chores, today);
            if plan.is_empty() {
                continue;
            }

            for expired in &plan.expired {
                chores_doc.chores.retain(|c| c.id != expired.id);
                removed += 1;
                info!(
                    chore_id = %expired.id,
                    template_id = %template.id,
                    due_date = %expired.due_date,
                    cycle = ?expired.cycle_id,
                    "retiring expired chore instance"
                );
                activity.push(ActivityEntry::system(
                    ActivityAction::ChoreExpired,
                    format!(
                        "Retired '{}' (cycle {}, was due {}): past due without completion",
                        expired.title,
                        expired.cycle_id.as_deref().unwrap_or("-"),
                        expired.due_date
                    ),
                    Some(expired.id.to_string()),
                ));
            }

            if let Some((mut instance, reason)) = plan.create {
                // Templates can outlive a member; new instances only carry
                // assignees the family still has. An empty members document
                // (unreadable or never written) skips the check.
                if !member_ids.is_empty() {
                    let before = instance.assignee_ids.len();
                    instance.assignee_ids.retain(|id| member_ids.contains(id));
                    if instance.assignee_ids.len() < before {
                        warn!(
                            chore_id = %instance.id,
                            template_id = %template.id,
                            "dropped assignees no longer in the family"
                        );
                    }
                }
                info!(
                    chore_id = %instance.id,
                    template_id = %template.id,
                    cycle = ?instance.cycle_id,
                    due_date = %instance.due_date,
                    reason = reason.describe(),
                    "materializing chore instance"
                );
                activity.push(ActivityEntry::system(
                    ActivityAction::ChoreCreated,
                    format!(
                        "Created '{}' for cycle {}, due {}: {}",
                        instance.title,
                        instance.cycle_id.as_deref().unwrap_or("-"),
                        instance.due_date,
                        reason.describe()
                    ),
                    Some(instance.id.to_string()),
                ));
                template.last_cycle_id = instance.cycle_id.clone();
                template.last_due_date = Some(instance.due_date);
                templates_changed = true;
                chores_doc.chores.push(instance);
                created += 1;
            }
        }

        let snapshot = chores_doc.chores.clone();
        for (orphan, matched) in expired_orphans(&snapshot, &templates_doc.templates, today) {
            warn!(
                chore_id = %orphan.id,
                title = %orphan.title,
                matched_template = ?matched,
                "removing expired instance without a template"
            );
            activity.push(ActivityEntry::system(
                ActivityAction::ChoreExpired,
                format!(
                    "Removed '{}' (was due {}): past due without completion, no template",
                    orphan.title, orphan.due_date
                ),
                Some(orphan.id.to_string()),
            ));
            let orphan_id = orphan.id;
            chores_doc.chores.retain(|c| c.id != orphan_id);
            removed += 1;
        }

        let chores_changed = created > 0 || removed > 0;

        // Instances before bookkeeping: if the template write fails after
        // the chore write, the surviving instance blocks re-creation on the
        // next pass, so nothing is duplicated or lost.
        if chores_changed {
            chores_doc.metadata.touch();
            match self.remote.write_chores(&chores_doc).await {
                Ok(()) => {}
                // The planned state was never confirmed, so it must not
                // reach the cache; leave the mirror to the next pass.
                Err(e) if e.is_unauthorized() => return self.hand_off_to_gateway().await,
                Err(e) => return Err(e.into()),
            }
        }
        if templates_changed {
            templates_doc.metadata.touch();
            match self.remote.write_templates(&templates_doc).await {
                Ok(()) => {}
                Err(e) if e.is_unauthorized() => return self.hand_off_to_gateway().await,
                Err(e) => return Err(e.into()),
            }
        }

        if !activity.is_empty() {
            self.append_activity(activity).await;
        }

        self.cache_sync
            .mirror(&templates_doc.templates, &chores_doc.chores)
            .await?;

        Ok(ReconcileOutcome {
            started: true,
            created,
            removed,
            redirected_to_gateway: false,
        })
    }

    /// The credentials-gone redirect, entered before any local planning:
    /// the given collections are remote-confirmed reads and safe to mirror.
    async fn redirect_to_gateway(
        &self,
        templates: &[ChoreTemplate],
        chores: &[ChoreInstance],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = self.hand_off_to_gateway().await?;
        if let Err(e) = self.cache_sync.mirror(templates, chores).await {
            warn!(error = %e, "cache mirror failed after gateway redirect");
        }
        Ok(outcome)
    }

    async fn hand_off_to_gateway(&self) -> Result<ReconcileOutcome, ReconcileError> {
        warn!("no usable credential; asking the gateway to refresh server-side");
        if let Err(e) = self.remote.gateway().request_refresh().await {
            warn!(error = %e, "gateway refresh request failed");
        }
        Ok(ReconcileOutcome {
            started: true,
            created: 0,
            removed: 0,
            redirected_to_gateway: true,
        })
    }

    /// Activity is bookkeeping about the pass, not part of it: failures are
    /// logged and do not fail the pass.
    async fn append_activity(&self, entries: Vec<ActivityEntry>) {
        if let Err(e) = self.remote.append_activity(entries).await {
            warn!(error = %e, "could not append to activity log");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::chore::{ChoreStatus, RecurrenceFrequency, RecurrenceRule};
    use uuid::Uuid;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily_template() -> ChoreTemplate {
        ChoreTemplate {
            id: Uuid::new_v4(),
            title: "feed the cat".into(),
            description: None,
            assignee_ids: vec!["kid-a".into()],
            created_by: "parent".into(),
            points: 5,
            due_date: None,
            recurrence: Some(RecurrenceRule::daily()),
            subtasks: Vec::new(),
            requires_photo: false,
            last_cycle_id: None,
            last_due_date: None,
            created_at: Utc::now(),
        }
    }

    fn instance_for(template: &ChoreTemplate, cycle: &str, due: NaiveDate) -> ChoreInstance {
        let mut instance = materialize(template, due).expect("materialize");
        instance.cycle_id = Some(cycle.to_string());
        instance.due_date = due;
        instance
    }

    /// Apply a plan the way the orchestrator does, including bookkeeping.
    fn apply(template: &mut ChoreTemplate, chores: &mut Vec<ChoreInstance>, plan: TemplatePlan) {
        for expired in &plan.expired {
            chores.retain(|c| c.id != expired.id);
        }
        if let Some((instance, _)) = plan.create {
            template.last_cycle_id = instance.cycle_id.clone();
            template.last_due_date = Some(instance.due_date);
            chores.push(instance);
        }
    }

    #[test]
    fn first_run_does_not_backfill() {
        // Never materialized, no instances: the pass must create nothing.
        let template = daily_template();
        let today = date(2025, 6, 1);
        let plan = plan_for_template(&template, &[], today);
        assert!(plan.expired.is_empty());
        assert!(plan.create.is_none());
    }

    #[test]
    fn catch_up_creates_exactly_one_instance() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-05-30".into());
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, &[], today);
        let (instance, reason) = plan.create.expect("should catch up");
        assert_eq!(reason, CreateReason::CatchUp);
        assert_eq!(instance.cycle_id.as_deref(), Some("2025-06-03"));
        assert_eq!(instance.due_date, today);
    }

    #[test]
    fn stale_instance_is_replaced_in_one_pass() {
        // The dated scenario: lastCycleId = 2025-06-01, an uncompleted
        // instance for that cycle, today = 2025-06-03.
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-01".into());
        let stale = instance_for(&template, "2025-06-01", date(2025, 6, 1));
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, std::slice::from_ref(&stale), today);
        assert_eq!(plan.expired.len(), 1);
        assert_eq!(plan.expired[0].id, stale.id);
        let (instance, _) = plan.create.expect("replacement instance");
        assert_eq!(instance.cycle_id.as_deref(), Some("2025-06-03"));
    }

    #[test]
    fn expired_current_cycle_instance_is_recreated() {
        // Weekly template whose current-cycle instance carried an explicit
        // past due date: removing it triggers re-creation for the same
        // cycle.
        let mut template = daily_template();
        template.recurrence = Some(RecurrenceRule {
            frequency: RecurrenceFrequency::Weekly,
            weekdays: None,
            day_of_month: None,
            end_date: None,
        });
        // 2025-06-03 is a Tuesday in ISO week 23.
        let today = date(2025, 6, 3);
        template.last_cycle_id = Some("2025-W23".into());
        let stale = instance_for(&template, "2025-W23", date(2025, 6, 2));

        let plan = plan_for_template(&template, std::slice::from_ref(&stale), today);
        assert_eq!(plan.expired.len(), 1);
        let (instance, reason) = plan.create.expect("recreated for current cycle");
        assert_eq!(reason, CreateReason::ReplacedExpired);
        assert_eq!(instance.cycle_id.as_deref(), Some("2025-W23"));
    }

    #[test]
    fn completed_instances_survive_expiry() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-01".into());
        let mut done = instance_for(&template, "2025-06-01", date(2025, 6, 1));
        done.status = ChoreStatus::Completed;
        let mut verified = instance_for(&template, "2025-05-31", date(2025, 5, 31));
        verified.status = ChoreStatus::Verified;
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, &[done, verified], today);
        assert!(plan.expired.is_empty());
    }

    #[test]
    fn completed_current_cycle_instance_blocks_creation() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-01".into());
        let mut done = instance_for(&template, "2025-06-03", date(2025, 6, 3));
        done.status = ChoreStatus::Completed;
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, std::slice::from_ref(&done), today);
        assert!(plan.create.is_none());
    }

    #[test]
    fn valid_current_instance_means_no_work() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-03".into());
        let current = instance_for(&template, "2025-06-03", date(2025, 6, 3));
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, std::slice::from_ref(&current), today);
        assert!(plan.is_empty());
    }

    #[test]
    fn planning_is_idempotent() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-01".into());
        let mut chores = vec![instance_for(&template, "2025-06-01", date(2025, 6, 1))];
        let today = date(2025, 6, 3);

        let plan = plan_for_template(&template, &chores, today);
        apply(&mut template, &mut chores, plan);
        assert_eq!(chores.len(), 1);
        assert_eq!(template.last_cycle_id.as_deref(), Some("2025-06-03"));

        // Same day, no external mutation: the second pass is a no-op.
        let again = plan_for_template(&template, &chores, today);
        assert!(again.is_empty());
    }

    #[test]
    fn at_most_one_instance_per_cycle() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-05-30".into());
        let mut chores = Vec::new();
        let today = date(2025, 6, 3);

        for _ in 0..3 {
            let plan = plan_for_template(&template, &chores, today);
            apply(&mut template, &mut chores, plan);
        }

        let current: Vec<_> = chores
            .iter()
            .filter(|c| c.is_for_cycle(template.id, "2025-06-03"))
            .collect();
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn end_dated_template_stops_materializing() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-05-31".into());
        if let Some(rule) = template.recurrence.as_mut() {
            rule.end_date = Some(date(2025, 5, 31));
        }
        let plan = plan_for_template(&template, &[], date(2025, 6, 3));
        assert!(plan.create.is_none());
    }

    #[test]
    fn template_without_rule_is_ignored() {
        let mut template = daily_template();
        template.recurrence = None;
        template.last_cycle_id = Some("2025-05-01".into());
        let plan = plan_for_template(&template, &[], date(2025, 6, 3));
        assert!(plan.is_empty());
    }

    #[test]
    fn other_templates_instances_are_untouched() {
        let mut template = daily_template();
        template.last_cycle_id = Some("2025-06-01".into());
        let other = daily_template();
        let foreign = instance_for(&other, "2025-06-01", date(2025, 6, 1));

        let plan = plan_for_template(&template, std::slice::from_ref(&foreign), date(2025, 6, 3));
        assert!(plan.expired.is_empty());
    }

    #[test]
    fn orphan_scan_finds_expired_untemplated_instances() {
        let template = daily_template();
        let today = date(2025, 6, 3);

        let mut orphan = instance_for(&template, "2025-06-01", date(2025, 6, 1));
        orphan.template_id = None;
        orphan.title = template.title.clone();

        let mut one_off_open = orphan.clone();
        one_off_open.id = Uuid::new_v4();
        one_off_open.title = "wash the car".into();
        one_off_open.due_date = date(2025, 6, 4);

        let mut one_off_done = orphan.clone();
        one_off_done.id = Uuid::new_v4();
        one_off_done.status = ChoreStatus::Completed;

        let instances = vec![orphan.clone(), one_off_open, one_off_done];
        let found = expired_orphans(&instances, std::slice::from_ref(&template), today);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.id, orphan.id);
        // Matched by title, for the log only.
        assert_eq!(found[0].1, Some(template.id));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        // Exercise the guard directly: while one pass holds it, a second
        // try_lock must fail rather than wait.
        let guard = tokio::sync::Mutex::new(());
        let held = guard.try_lock().expect("first acquire");
        assert!(guard.try_lock().is_err());
        drop(held);
        assert!(guard.try_lock().is_ok());
    }
}
