//! Desktop notifications for chore-state changes. Best effort: a failed
//! notification is logged and forgotten.

use tracing::{info, warn};

#[derive(Clone)]
pub struct NotificationService {
    enabled: bool,
}

impl NotificationService {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub async fn notify(&self, title: &str, message: &str) {
        info!(title, message, "notification");
        if !self.enabled {
            return;
        }

        let summary = title.to_string();
        let body = message.to_string();
        let result = tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(&summary)
                .body(&body)
                .appname("Choreboard")
                .show()
                .map(|_| ())
        })
        .await;

        match result {
            Ok(Err(e)) => warn!(error = %e, "failed to show notification"),
            Err(e) => warn!(error = %e, "notification task panicked"),
            Ok(Ok(())) => {}
        }
    }
}
