mod fetcher;
mod link;
mod sources;

pub use fetcher::FeedFetcher;
pub use link::{extract_links, normalize_link};
pub use sources::{FeedSource, FeedSources};
