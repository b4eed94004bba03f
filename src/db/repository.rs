use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{ArchiveRecord, Subscriber, SubscriberStats};

use super::schema::SCHEMA;

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Open a store given as a plain path or a `sqlite://` URI.
    pub async fn open_uri(uri: &str) -> Result<Self> {
        let path = uri.strip_prefix("sqlite://").unwrap_or(uri);
        Self::new(path).await
    }

    // Archive operations

    /// True when a stored link equals `link` or starts with it.
    pub async fn archive_contains(&self, link: &str) -> Result<bool> {
        let link = link.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let found: i64 = conn.query_row(
                    r#"SELECT EXISTS(
                           SELECT 1 FROM articles
                           WHERE link = ?1 OR substr(link, 1, length(?1)) = ?1
                       )"#,
                    params![link],
                    |row| row.get(0),
                )?;
                Ok(found != 0)
            })
            .await?;
        Ok(exists)
    }

    /// Insert unless the link is already archived. Returns whether a row was written.
    pub async fn insert_archive_record(&self, record: ArchiveRecord) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO articles (link, original_link, sent_at, status) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        record.link,
                        record.original_link,
                        record.sent_at.to_rfc3339(),
                        record.status.as_str(),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn archive_count(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    // Subscriber operations

    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let subscribers = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT email, active, joined_at, unsubscribed_at FROM subscribers WHERE active = 1 ORDER BY id",
                )?;
                let subscribers = stmt
                    .query_map([], subscriber_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscribers)
            })
            .await?;
        Ok(subscribers)
    }

    /// Insert an active subscriber, or reactivate an existing one.
    /// Returns true when the address was new.
    pub async fn add_subscriber(&self, email: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO subscribers (email, active, joined_at) VALUES (?1, 1, ?2)",
                    params![email, Utc::now().to_rfc3339()],
                )?;
                if changed == 0 {
                    conn.execute(
                        "UPDATE subscribers SET active = 1, unsubscribed_at = NULL WHERE email = ?1",
                        params![email],
                    )?;
                }
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// Mark a subscriber as having opted out. Returns whether the address was known.
    pub async fn unsubscribe(&self, email: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        let found = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE subscribers SET active = 0, unsubscribed_at = ?2 WHERE email = ?1",
                    params![email, Utc::now().to_rfc3339()],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(found)
    }

    pub async fn deactivate_all(&self) -> Result<usize> {
        let changed = self
            .conn
            .call(|conn| {
                let changed = conn.execute("UPDATE subscribers SET active = 0 WHERE active = 1", [])?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn activate(&self, email: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        let found = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE subscribers SET active = 1 WHERE email = ?1",
                    params![email],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(found)
    }

    /// Reactivate everyone who never explicitly unsubscribed.
    pub async fn reactivate_remaining(&self) -> Result<usize> {
        let changed = self
            .conn
            .call(|conn| {
                let changed = conn.execute(
                    "UPDATE subscribers SET active = 1 WHERE unsubscribed_at IS NULL AND active = 0",
                    [],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn subscriber_stats(&self) -> Result<SubscriberStats> {
        let stats = self
            .conn
            .call(|conn| {
                let (total, active): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM subscribers",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok((total, active))
            })
            .await?;
        let total = stats.0.max(0) as u64;
        let active = stats.1.max(0) as u64;
        Ok(SubscriberStats {
            total,
            active,
            inactive: total - active,
        })
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn subscriber_from_row(row: &Row) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        email: row.get(0)?,
        active: row.get::<_, i64>(1)? != 0,
        joined_at: row
            .get::<_, String>(2)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        unsubscribed_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| parse_datetime(&s)),
    })
}
