use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;

use crate::db::DedupStore;
use crate::error::Result;
use crate::models::{Category, ContentPool, FeedEntry};

use super::sources::FeedSource;

pub const SUMMARY_MAX_CHARS: usize = 600;

const FALLBACK_SOURCE_NAME: &str = "Web";
const UNTITLED: &str = "Untitled";

// Wide enough that html2text never wraps a summary mid-sentence.
const RENDER_WIDTH: usize = 10_000;

/// Outcome of one fetch cycle across every configured source.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub pool: ContentPool,
    pub dedup_disabled: bool,
    pub failed_sources: Vec<String>,
    /// Entries dropped because their link was already archived.
    pub already_sent: usize,
    /// Archive lookups that failed; those entries were kept as new.
    pub lookup_failures: usize,
}

/// Entries that survived the archive check.
#[derive(Debug, Default)]
pub struct Unsent {
    pub fresh: Vec<FeedEntry>,
    pub already_sent: usize,
    pub lookup_failures: usize,
}

pub struct FeedFetcher {
    client: Client,
    window: chrono::Duration,
}

impl FeedFetcher {
    pub fn new(window_days: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("ask-your-mother/1.0")
            .build()?;

        Ok(Self {
            client,
            window: chrono::Duration::days(i64::from(window_days)),
        })
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<Feed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;
        Ok(feed)
    }

    /// Fetch every source in order and collect fresh, unsent entries.
    ///
    /// A source that fails to download or parse contributes nothing; the
    /// failure is logged and the remaining sources are still read.
    pub async fn build_pool(
        &self,
        sources: &[FeedSource],
        dedup: &DedupStore,
        now: DateTime<Utc>,
    ) -> FetchReport {
        let mut report = FetchReport {
            dedup_disabled: !dedup.is_enabled(),
            ..FetchReport::default()
        };

        tracing::info!(
            "Fetching {} sources from the last {} days",
            sources.len(),
            self.window.num_days()
        );

        for source in sources {
            let feed = match self.fetch_feed(&source.url).await {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!("Error reading {}: {}", source.url, e);
                    report.failed_sources.push(source.url.clone());
                    continue;
                }
            };

            let candidates = entries_from_feed(&feed, source, now, self.window);
            let found = candidates.len();
            let unsent = retain_unsent(candidates, dedup).await;
            report.already_sent += unsent.already_sent;
            report.lookup_failures += unsent.lookup_failures;

            tracing::debug!(
                "{}: {} recent entries, {} already sent",
                source.url,
                found,
                unsent.already_sent
            );

            for entry in unsent.fresh {
                report.pool.push(entry);
            }
        }

        for category in Category::ALL {
            tracing::info!("Pool {}: {} entries", category, report.pool.count(category));
        }
        if report.lookup_failures > 0 {
            tracing::warn!(
                "{} archive lookups failed, dedup was partly degraded",
                report.lookup_failures
            );
        }

        report
    }
}

/// Drop entries whose link is already archived. A failed lookup keeps the
/// entry and is counted.
pub async fn retain_unsent(entries: Vec<FeedEntry>, dedup: &DedupStore) -> Unsent {
    let mut unsent = Unsent {
        fresh: Vec::with_capacity(entries.len()),
        ..Unsent::default()
    };
    for entry in entries {
        match dedup.lookup(&entry.link).await {
            Ok(true) => unsent.already_sent += 1,
            Ok(false) => unsent.fresh.push(entry),
            Err(e) => {
                tracing::warn!("Dedup lookup failed for {}: {}", entry.link, e);
                unsent.lookup_failures += 1;
                unsent.fresh.push(entry);
            }
        }
    }
    unsent
}

/// Normalize a parsed feed into entries published inside the window.
pub fn entries_from_feed(
    feed: &Feed,
    source: &FeedSource,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Vec<FeedEntry> {
    let window_start = now - window;
    let source_name = feed
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_SOURCE_NAME.to_string())
        .to_uppercase();

    let intake = source.intake_cap().unwrap_or(feed.entries.len());

    feed.entries
        .iter()
        .take(intake)
        .filter(|entry| {
            entry
                .published
                .or(entry.updated)
                .is_some_and(|published| published > window_start)
        })
        .filter_map(|entry| {
            let link = entry_link(entry)?;
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string());
            let raw_summary = entry_summary(entry).unwrap_or(&title);

            Some(FeedEntry {
                summary: plain_summary(raw_summary),
                title,
                link,
                source: source_name.clone(),
                category: source.category,
            })
        })
        .collect()
}

/// First link, or the guid when it is itself a URL.
fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .or_else(|| {
            let id = entry.id.trim();
            (id.starts_with("http://") || id.starts_with("https://")).then(|| id.to_string())
        })
}

fn entry_summary(entry: &Entry) -> Option<&str> {
    entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.as_str()))
        })
        .filter(|s| !s.trim().is_empty())
}

/// Render summary HTML to plain text on one line and cap the length.
pub fn plain_summary(html: &str) -> String {
    let text = html2text::config::plain_no_decorate()
        .string_from_read(html.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|_| html.to_string());
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SUMMARY_MAX_CHARS).collect()
}
