use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newsletter recipient, owned by the signup form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}
