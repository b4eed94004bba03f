use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::feed::normalize_link;
use crate::models::{ArchiveRecord, ArchiveStatus};

use super::Repository;

/// Previously-sent link ledger.
///
/// When the backing store cannot be reached the adapter runs with dedup
/// disabled: every link counts as new and recording fails softly.
#[derive(Clone)]
pub struct DedupStore {
    repository: Option<Repository>,
}

impl DedupStore {
    pub fn new(repository: Option<Repository>) -> Self {
        if repository.is_none() {
            tracing::warn!("Dedup store unavailable, every link will be treated as new");
        }
        Self { repository }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Open the store at `uri`, degrading to disabled on failure.
    pub async fn connect(uri: &str) -> Self {
        match Repository::open_uri(uri).await {
            Ok(repository) => Self::new(Some(repository)),
            Err(e) => {
                tracing::warn!("Could not open dedup store {}: {}", uri, e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.repository.is_some()
    }

    #[cfg(test)]
    pub fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }

    /// Whether `link` (normalized here) has already been sent.
    /// Lookup failures are logged and treated as "not sent".
    pub async fn exists(&self, link: &str) -> bool {
        match self.lookup(link).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Dedup lookup failed for {}: {}", link, e);
                false
            }
        }
    }

    /// Like `exists`, but hands lookup errors back so callers can count them.
    /// A disabled store answers `Ok(false)`.
    pub async fn lookup(&self, link: &str) -> Result<bool> {
        let Some(repository) = &self.repository else {
            return Ok(false);
        };
        let normalized = normalize_link(link);
        if normalized.is_empty() {
            return Ok(false);
        }
        repository.archive_contains(&normalized).await
    }

    /// Record a sent link. Returns `Ok(false)` when the exact normalized link
    /// is already archived; the unique index decides, not a prior lookup.
    pub async fn record(
        &self,
        link: &str,
        original_link: &str,
        sent_at: DateTime<Utc>,
        status: ArchiveStatus,
    ) -> Result<bool> {
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| AppError::StoreUnavailable("dedup disabled".to_string()))?;

        let normalized = normalize_link(link);
        if normalized.is_empty() {
            return Ok(false);
        }
        repository
            .insert_archive_record(ArchiveRecord {
                link: normalized,
                original_link: original_link.to_string(),
                sent_at,
                status,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_store_disables_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().join("missing").join("nested").join("store.db");
        let dedup = DedupStore::connect(uri.to_str().unwrap()).await;

        assert!(!dedup.is_enabled());
        assert!(!dedup.exists("https://a.example/1").await);
        let err = dedup
            .record("https://a.example/1", "https://a.example/1", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn record_twice_keeps_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let dedup = DedupStore::connect(dir.path().join("store.db").to_str().unwrap()).await;
        assert!(dedup.is_enabled());

        let first = dedup
            .record(" https://a.example/1?ref=x", "https://a.example/1?ref=x", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap();
        let second = dedup
            .record("https://a.example/1", "https://a.example/1", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(dedup.repository().unwrap().archive_count().await.unwrap(), 1);
        assert!(dedup.exists("https://a.example/1?utm=mail").await);
    }

    #[tokio::test]
    async fn shorter_link_is_recorded_after_longer_one() {
        let dir = tempfile::tempdir().unwrap();
        let dedup = DedupStore::connect(dir.path().join("store.db").to_str().unwrap()).await;

        let long = dedup
            .record("https://x.example/post-2", "https://x.example/post-2", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap();
        let short = dedup
            .record("https://x.example/post", "https://x.example/post", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap();

        assert!(long);
        assert!(short);
        assert_eq!(dedup.repository().unwrap().archive_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn lookup_reports_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let dedup = DedupStore::connect(path.to_str().unwrap()).await;
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE articles")
            .unwrap();

        assert!(dedup.lookup("https://a.example/1").await.is_err());
        assert!(!dedup.exists("https://a.example/1").await);
        assert!(!DedupStore::disabled().lookup("https://a.example/1").await.unwrap());
    }

    #[tokio::test]
    async fn empty_links_are_never_matched() {
        let dir = tempfile::tempdir().unwrap();
        let dedup = DedupStore::connect(dir.path().join("store.db").to_str().unwrap()).await;
        dedup
            .record("https://a.example/1", "https://a.example/1", Utc::now(), ArchiveStatus::Sent)
            .await
            .unwrap();

        assert!(!dedup.exists("   ").await);
    }
}
