use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Missing required secret: {0}")]
    MissingSecret(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generative API error: {0}")]
    GenerativeApi(String),

    #[error("Rate limited by generative API: {0}")]
    RateLimited(String),

    #[error("Not enough content to curate")]
    NotEnoughContent,

    #[error("Curated digest failed validation: {0}")]
    InvalidDigest(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Mail address error: {0}")]
    MailAddress(#[from] lettre::address::AddressError),

    #[error("Mail build error: {0}")]
    MailBuild(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the error belongs to the retryable rate-limit class.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_errors_are_retryable() {
        assert!(AppError::RateLimited("429".into()).is_rate_limited());
        assert!(!AppError::GenerativeApi("500".into()).is_rate_limited());
        assert!(!AppError::NotEnoughContent.is_rate_limited());
    }
}
