use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Per-document bookkeeping. The counter is observability only: writes do
/// not compare versions, so last writer wins.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SyncMetadata {
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl SyncMetadata {
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self {
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_increments_version() {
        let mut meta = SyncMetadata::default();
        meta.touch();
        meta.touch();
        assert_eq!(meta.version, 2);
    }
}
