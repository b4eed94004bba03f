use std::sync::LazyLock;

use regex::Regex;

use crate::ai::GeminiClient;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"));

pub const USAGE: &str = "Usage: ask-your-mother [--list-models | --subscriber-stats | --reactivate-subscribers | --reset-subscribers <email> | --add-subscriber <email> | --remove-subscriber <email>]

With no arguments the weekly digest is fetched, curated and sent.
Set DIGEST_MODE=LIVE to mail every active subscriber instead of the admin.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RunDigest,
    ListModels,
    SubscriberStats,
    ReactivateSubscribers,
    ResetSubscribers(String),
    AddSubscriber(String),
    RemoveSubscriber(String),
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let flag = match args.first() {
            Some(flag) => flag.as_str(),
            None => return Ok(Command::RunDigest),
        };
        let value = || {
            args.get(1)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} needs an email address", flag)))
        };

        match flag {
            "--list-models" => Ok(Command::ListModels),
            "--subscriber-stats" => Ok(Command::SubscriberStats),
            "--reactivate-subscribers" => Ok(Command::ReactivateSubscribers),
            "--reset-subscribers" => Ok(Command::ResetSubscribers(value()?)),
            "--add-subscriber" => Ok(Command::AddSubscriber(value()?)),
            "--remove-subscriber" => Ok(Command::RemoveSubscriber(value()?)),
            "-h" | "--help" => Ok(Command::Help),
            other => Err(AppError::Config(format!("unknown argument {}\n\n{}", other, USAGE))),
        }
    }
}

impl Command {
    /// Help prints usage without touching the config file.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Command::Help)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

pub async fn list_models(config: &Config) -> Result<()> {
    let api_key = config
        .gemini_api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or(AppError::MissingSecret("gemini_api_key"))?;
    let client = GeminiClient::new(api_key, config.gemini_model.clone())?;

    println!("--- AVAILABLE MODELS ---");
    for model in client.list_models().await? {
        println!("Name: {}", model.name);
    }
    Ok(())
}

/// Deactivate everyone, then reactivate only `email`.
pub async fn reset_subscribers(repository: &Repository, email: &str) -> Result<bool> {
    let deactivated = repository.deactivate_all().await?;
    tracing::info!("Deactivated {} subscribers", deactivated);

    let found = repository.activate(email).await?;
    if found {
        tracing::info!("Reactivated {}", email);
    } else {
        tracing::warn!("Could not find {} in the store. Are they signed up?", email);
    }
    Ok(found)
}

pub async fn reactivate_subscribers(repository: &Repository) -> Result<usize> {
    let restored = repository.reactivate_remaining().await?;
    tracing::info!("Reactivated {} subscribers", restored);
    Ok(restored)
}

pub async fn add_subscriber(repository: &Repository, email: &str) -> Result<bool> {
    if !is_valid_email(email) {
        return Err(AppError::Config(format!("{} is not a valid email address", email)));
    }
    repository.add_subscriber(email).await
}

pub async fn print_subscriber_stats(repository: &Repository) -> Result<()> {
    let stats = repository.subscriber_stats().await?;
    let archived = repository.archive_count().await?;
    println!("--------------------------------");
    println!("Total Records:          {}", stats.total);
    println!("Active Subscribers:     {}", stats.active);
    println!("Inactive (Unsubbed):    {}", stats.inactive);
    println!("Archived Links:         {}", archived);
    println!("--------------------------------");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn no_arguments_runs_the_digest() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::RunDigest);
    }

    #[test]
    fn parses_maintenance_flags() {
        assert_eq!(Command::parse(&args(&["--list-models"])).unwrap(), Command::ListModels);
        assert_eq!(
            Command::parse(&args(&["--reset-subscribers", "dad@example.com"])).unwrap(),
            Command::ResetSubscribers("dad@example.com".into())
        );
        assert_eq!(
            Command::parse(&args(&["--reactivate-subscribers"])).unwrap(),
            Command::ReactivateSubscribers
        );
    }

    #[test]
    fn help_skips_config_loading() {
        let help = Command::parse(&args(&["--help"])).unwrap();
        assert_eq!(help, Command::Help);
        assert!(!help.needs_config());
        assert!(Command::RunDigest.needs_config());
        assert!(Command::AddSubscriber("dad@example.com".into()).needs_config());
    }

    #[test]
    fn flags_needing_an_email_reject_missing_value() {
        assert!(Command::parse(&args(&["--add-subscriber"])).is_err());
        assert!(Command::parse(&args(&["--reset-subscribers", "  "])).is_err());
        assert!(Command::parse(&args(&["--refresh"])).is_err());
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("dad@example.com"));
        assert!(!is_valid_email("dad@example"));
        assert!(!is_valid_email("not an email"));
    }

    #[tokio::test]
    async fn add_subscriber_validates_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::new(dir.path().join("store.db").to_str().unwrap())
            .await
            .unwrap();

        assert!(add_subscriber(&repository, "bogus").await.is_err());
        assert!(add_subscriber(&repository, "dad@example.com").await.unwrap());
        assert_eq!(repository.subscriber_stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn reset_reports_unknown_target() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::new(dir.path().join("store.db").to_str().unwrap())
            .await
            .unwrap();
        repository.add_subscriber("a@example.com").await.unwrap();

        assert!(!reset_subscribers(&repository, "ghost@example.com").await.unwrap());
        assert_eq!(repository.subscriber_stats().await.unwrap().active, 0);
        assert_eq!(reactivate_subscribers(&repository).await.unwrap(), 1);
    }
}
