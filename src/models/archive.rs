use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    #[default]
    Sent,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Sent => "sent",
        }
    }
}

/// Marker that a link went out in a digest and must not be sent again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Normalized link, the dedup key.
    pub link: String,
    pub original_link: String,
    pub sent_at: DateTime<Utc>,
    pub status: ArchiveStatus,
}

/// Counts produced by one archiving pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveOutcome {
    pub saved: usize,
    pub skipped: usize,
}
