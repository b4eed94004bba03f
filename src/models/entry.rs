use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Read,
    Listen,
    Watch,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Read, Category::Listen, Category::Watch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Read => "read",
            Category::Listen => "listen",
            Category::Watch => "watch",
        }
    }

    /// Prefix of the synthetic candidate index shown to the model.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Read => "READ",
            Category::Listen => "LISTEN",
            Category::Watch => "WATCH",
        }
    }

    /// Section heading used in the digest.
    pub fn heading(&self) -> &'static str {
        match self {
            Category::Read => "READING",
            Category::Listen => "LISTENING",
            Category::Watch => "WATCHING",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate item pulled from a feed during this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Plain text, at most 600 characters.
    pub summary: String,
    pub source: String,
    pub category: Category,
}

/// Per-category ceilings applied before the pool is shown to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLimits {
    #[serde(default = "default_read_limit")]
    pub read: usize,
    #[serde(default = "default_media_limit")]
    pub listen: usize,
    #[serde(default = "default_media_limit")]
    pub watch: usize,
}

fn default_read_limit() -> usize {
    15
}

fn default_media_limit() -> usize {
    5
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            read: default_read_limit(),
            listen: default_media_limit(),
            watch: default_media_limit(),
        }
    }
}

impl SampleLimits {
    pub fn for_category(&self, category: Category) -> usize {
        match category {
            Category::Read => self.read,
            Category::Listen => self.listen,
            Category::Watch => self.watch,
        }
    }
}

/// Fresh, not-yet-sent entries grouped by category, in intake order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPool {
    entries: BTreeMap<Category, Vec<FeedEntry>>,
}

impl ContentPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FeedEntry) {
        self.entries.entry(entry.category).or_default().push(entry);
    }

    pub fn get(&self, category: Category) -> &[FeedEntry] {
        self.entries
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, category: Category) -> usize {
        self.get(category).len()
    }

    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn has_reading(&self) -> bool {
        self.count(Category::Read) > 0
    }

    /// Shuffle each category, then cut it down to its limit.
    pub fn sample<R: Rng + ?Sized>(&self, limits: &SampleLimits, rng: &mut R) -> ContentPool {
        let mut sampled = ContentPool::new();
        for category in Category::ALL {
            let mut entries = self.get(category).to_vec();
            entries.shuffle(rng);
            entries.truncate(limits.for_category(category));
            if !entries.is_empty() {
                sampled.entries.insert(category, entries);
            }
        }
        sampled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn entry(category: Category, n: usize) -> FeedEntry {
        FeedEntry {
            title: format!("{} {}", category, n),
            link: format!("https://example.com/{}/{}", category, n),
            summary: String::new(),
            source: "EXAMPLE".to_string(),
            category,
        }
    }

    #[test]
    fn push_groups_by_category() {
        let mut pool = ContentPool::new();
        pool.push(entry(Category::Read, 0));
        pool.push(entry(Category::Watch, 0));
        pool.push(entry(Category::Read, 1));

        assert_eq!(pool.count(Category::Read), 2);
        assert_eq!(pool.count(Category::Listen), 0);
        assert_eq!(pool.count(Category::Watch), 1);
        assert_eq!(pool.total(), 3);
        assert_eq!(pool.get(Category::Read)[1].title, "read 1");
    }

    #[test]
    fn sample_applies_ceilings() {
        let mut pool = ContentPool::new();
        for n in 0..20 {
            pool.push(entry(Category::Read, n));
        }
        for n in 0..8 {
            pool.push(entry(Category::Listen, n));
        }
        for n in 0..3 {
            pool.push(entry(Category::Watch, n));
        }

        let mut rng = StdRng::seed_from_u64(7);
        let sampled = pool.sample(&SampleLimits::default(), &mut rng);

        assert_eq!(sampled.count(Category::Read), 15);
        assert_eq!(sampled.count(Category::Listen), 5);
        assert_eq!(sampled.count(Category::Watch), 3);
        for picked in sampled.get(Category::Read) {
            assert!(pool.get(Category::Read).contains(picked));
        }
    }

    #[test]
    fn sample_keeps_every_entry_when_under_ceiling() {
        let mut pool = ContentPool::new();
        for n in 0..10 {
            pool.push(entry(Category::Read, n));
        }

        let mut rng = StdRng::seed_from_u64(42);
        let sampled = pool.sample(&SampleLimits::default(), &mut rng);

        let mut titles: Vec<_> = sampled
            .get(Category::Read)
            .iter()
            .map(|e| e.title.clone())
            .collect();
        titles.sort();
        let mut expected: Vec<_> = (0..10).map(|n| format!("read {}", n)).collect();
        expected.sort();
        assert_eq!(titles, expected);
    }
}
