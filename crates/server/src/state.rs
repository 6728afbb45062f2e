use std::sync::Arc;

use db::DBService;
use services::services::{chores::ChoreService, reconcile::ReconcileService};

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub chores: Arc<ChoreService>,
    pub reconciler: Arc<ReconcileService>,
}
