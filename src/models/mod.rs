mod archive;
mod entry;
mod subscriber;

pub use archive::{ArchiveOutcome, ArchiveRecord, ArchiveStatus};
pub use entry::{Category, ContentPool, FeedEntry, SampleLimits};
pub use subscriber::{Subscriber, SubscriberStats};
