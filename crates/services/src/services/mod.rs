pub mod cache_sync;
pub mod chores;
pub mod cycle;
pub mod materialize;
pub mod notification;
pub mod reconcile;
