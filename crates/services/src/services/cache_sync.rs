//! Mirrors the remote chore and template collections into the local read
//! cache and turns the before/after difference into notifications.
//!
//! The cache never leads the remote store: callers mirror only state that
//! a confirmed remote read or write produced.

use db::{
    DBService, DbError,
    cache::{ChoreCache, TemplateCache},
    models::chore::{ChoreInstance, ChoreStatus, ChoreTemplate},
};
use remote::{RemoteError, RemoteStore};
use thiserror::Error;

use super::notification::NotificationService;

#[derive(Debug, Error)]
pub enum CacheSyncError {
    #[error("cache error: {0}")]
    Cache(#[from] DbError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// A chore-set transition observed while mirroring.
#[derive(Debug, Clone)]
pub enum ChoreChange {
    Added(ChoreInstance),
    Removed(ChoreInstance),
    Completed(ChoreInstance),
    Verified(ChoreInstance),
    Rejected(ChoreInstance),
}

/// Diff two chore sets by id. Status transitions are reported for chores
/// present in both.
pub fn diff_chores(before: &[ChoreInstance], after: &[ChoreInstance]) -> Vec<ChoreChange> {
    let mut changes = Vec::new();

    for chore in after {
        match before.iter().find(|b| b.id == chore.id) {
            None => changes.push(ChoreChange::Added(chore.clone())),
            Some(previous) => {
                if previous.status != chore.status {
                    match chore.status {
                        ChoreStatus::Completed => changes.push(ChoreChange::Completed(chore.clone())),
                        ChoreStatus::Verified => changes.push(ChoreChange::Verified(chore.clone())),
                        ChoreStatus::Pending if previous.status == ChoreStatus::Completed => {
                            changes.push(ChoreChange::Rejected(chore.clone()))
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    for chore in before {
        if !after.iter().any(|a| a.id == chore.id) {
            changes.push(ChoreChange::Removed(chore.clone()));
        }
    }

    changes
}

#[derive(Clone)]
pub struct CacheSyncService {
    db: DBService,
    notifications: NotificationService,
}

impl CacheSyncService {
    pub fn new(db: DBService, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    /// Replace both caches with the given collections and notify for every
    /// observed change.
    pub async fn mirror(
        &self,
        templates: &[ChoreTemplate],
        chores: &[ChoreInstance],
    ) -> Result<Vec<ChoreChange>, CacheSyncError> {
        let before = ChoreCache::find_all(&self.db.pool).await?;
        TemplateCache::replace_all(&self.db.pool, templates).await?;
        ChoreCache::replace_all(&self.db.pool, chores).await?;

        let changes = diff_chores(&before, chores);
        for change in &changes {
            self.announce(change).await;
        }
        Ok(changes)
    }

    /// Pull the current remote collections and mirror them.
    pub async fn refresh_from_remote(
        &self,
        store: &RemoteStore,
    ) -> Result<Vec<ChoreChange>, CacheSyncError> {
        let templates = store.read_templates().await?.value;
        let chores = store.read_chores().await?.value;
        self.mirror(&templates.templates, &chores.chores).await
    }

    async fn announce(&self, change: &ChoreChange) {
        match change {
            ChoreChange::Added(c) => {
                self.notifications
                    .notify("New chore", &format!("'{}' is due {}", c.title, c.due_date))
                    .await
            }
            ChoreChange::Removed(c) => {
                self.notifications
                    .notify("Chore removed", &format!("'{}' was removed", c.title))
                    .await
            }
            ChoreChange::Completed(c) => {
                self.notifications
                    .notify(
                        "Chore completed",
                        &format!("'{}' is waiting for verification", c.title),
                    )
                    .await
            }
            ChoreChange::Verified(c) => {
                self.notifications
                    .notify("Chore verified", &format!("'{}' was approved", c.title))
                    .await
            }
            ChoreChange::Rejected(c) => {
                self.notifications
                    .notify(
                        "Chore sent back",
                        &format!("'{}' needs to be redone", c.title),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use db::models::chore::CreateChore;

    use super::*;

    fn chore(title: &str) -> ChoreInstance {
        CreateChore {
            title: title.into(),
            description: None,
            assignee_ids: vec!["kid-a".into()],
            points: 5,
            due_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            subtasks: None,
            requires_photo: None,
            created_by: "parent".into(),
        }
        .into_instance()
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let a = chore("dishes");
        let b = chore("laundry");
        let changes = diff_chores(&[a.clone()], &[b.clone()]);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], ChoreChange::Added(c) if c.id == b.id));
        assert!(matches!(&changes[1], ChoreChange::Removed(c) if c.id == a.id));
    }

    #[test]
    fn diff_reports_status_transitions() {
        let pending = chore("dishes");
        let mut completed = pending.clone();
        completed.status = ChoreStatus::Completed;
        let mut verified = completed.clone();
        verified.status = ChoreStatus::Verified;
        let mut rejected = completed.clone();
        rejected.status = ChoreStatus::Pending;

        assert!(matches!(
            diff_chores(std::slice::from_ref(&pending), std::slice::from_ref(&completed)).as_slice(),
            [ChoreChange::Completed(_)]
        ));
        assert!(matches!(
            diff_chores(std::slice::from_ref(&completed), std::slice::from_ref(&verified)).as_slice(),
            [ChoreChange::Verified(_)]
        ));
        assert!(matches!(
            diff_chores(std::slice::from_ref(&completed), std::slice::from_ref(&rejected)).as_slice(),
            [ChoreChange::Rejected(_)]
        ));
    }

    #[test]
    fn diff_of_identical_sets_is_empty() {
        let a = chore("dishes");
        assert!(diff_chores(std::slice::from_ref(&a), std::slice::from_ref(&a)).is_empty());
    }

    #[tokio::test]
    async fn mirror_replaces_cache_and_reports_changes() {
        let db = DBService::new_in_memory().await.unwrap();
        let sync = CacheSyncService::new(db.clone(), NotificationService::new(false));

        let first = vec![chore("dishes")];
        let changes = sync.mirror(&[], &first).await.unwrap();
        assert_eq!(changes.len(), 1);

        let mut done = first[0].clone();
        done.status = ChoreStatus::Completed;
        let changes = sync.mirror(&[], std::slice::from_ref(&done)).await.unwrap();
        assert!(matches!(changes.as_slice(), [ChoreChange::Completed(_)]));

        let cached = ChoreCache::find_all(&db.pool).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].status, ChoreStatus::Completed);
    }
}
