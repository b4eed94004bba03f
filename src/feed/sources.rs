use serde::{Deserialize, Serialize};

use crate::models::Category;

/// High-volume aggregators only contribute their first few entries.
const AGGREGATOR_INTAKE_CAP: usize = 10;
const AGGREGATOR_HOSTS: &[&str] = &["reddit.com"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub category: Category,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, category: Category) -> Self {
        Self {
            url: url.into(),
            category,
        }
    }

    pub fn is_aggregator(&self) -> bool {
        let host = url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        match host {
            Some(host) => AGGREGATOR_HOSTS
                .iter()
                .any(|agg| host == *agg || host.ends_with(&format!(".{}", agg))),
            None => self.url.contains("reddit"),
        }
    }

    /// Maximum number of raw entries taken from this source, if capped.
    pub fn intake_cap(&self) -> Option<usize> {
        self.is_aggregator().then_some(AGGREGATOR_INTAKE_CAP)
    }
}

/// Feed URLs partitioned by category, as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSources {
    #[serde(default = "default_read_feeds")]
    pub read: Vec<String>,
    #[serde(default = "default_listen_feeds")]
    pub listen: Vec<String>,
    #[serde(default = "default_watch_feeds")]
    pub watch: Vec<String>,
}

fn default_read_feeds() -> Vec<String> {
    [
        "https://www.reddit.com/r/daddit/top/.rss?t=week",
        "https://www.janetlansbury.com/feed/",
        "https://busytoddler.com/feed/",
        "https://www.fatherly.com/feed",
        "https://www.pbs.org/parents/thrive/rss",
        "https://yourparentingmojo.com/feed/",
        "https://www.zerotothree.org/feed/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_listen_feeds() -> Vec<String> {
    [
        "https://rss.art19.com/the-daily-dad",
        "https://feeds.npr.org/510344/podcast.xml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_watch_feeds() -> Vec<String> {
    [
        "https://www.youtube.com/feeds/videos.xml?channel_id=UCNepEAWZH0TBu7dkxIbluDw",
        "https://www.youtube.com/feeds/videos.xml?channel_id=UCc_-hy0u9-oKlNdMKHBudcQ",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for FeedSources {
    fn default() -> Self {
        Self {
            read: default_read_feeds(),
            listen: default_listen_feeds(),
            watch: default_watch_feeds(),
        }
    }
}

impl FeedSources {
    /// All sources in declaration order: read, then listen, then watch.
    pub fn all(&self) -> Vec<FeedSource> {
        Category::ALL
            .into_iter()
            .flat_map(|category| {
                self.urls(category)
                    .iter()
                    .map(move |url| FeedSource::new(url.clone(), category))
            })
            .collect()
    }

    pub fn urls(&self, category: Category) -> &[String] {
        match category {
            Category::Read => &self.read,
            Category::Listen => &self.listen,
            Category::Watch => &self.watch,
        }
    }
}
