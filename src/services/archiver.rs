use chrono::{DateTime, Utc};

use crate::db::DedupStore;
use crate::error::{AppError, Result};
use crate::feed::extract_links;
use crate::models::{ArchiveOutcome, ArchiveStatus};

/// Records the links of a sent digest so they are not offered again.
pub struct Archiver {
    dedup: DedupStore,
}

impl Archiver {
    pub fn new(dedup: DedupStore) -> Self {
        Self { dedup }
    }

    pub async fn archive(&self, html: &str, sent_at: DateTime<Utc>) -> Result<ArchiveOutcome> {
        if !self.dedup.is_enabled() {
            return Err(AppError::StoreUnavailable(
                "cannot archive sent links".to_string(),
            ));
        }

        let mut outcome = ArchiveOutcome::default();
        for link in extract_links(html) {
            match self
                .dedup
                .record(&link, &link, sent_at, ArchiveStatus::Sent)
                .await
            {
                Ok(true) => outcome.saved += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => tracing::warn!("Failed to archive {}: {}", link, e),
            }
        }

        tracing::info!(
            "Archive updated: saved {} new links, skipped {} duplicates",
            outcome.saved,
            outcome.skipped
        );
        Ok(outcome)
    }
}
