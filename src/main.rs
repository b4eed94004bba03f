mod ai;
mod app;
mod commands;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod services;

use app::{App, RunOutcome};
use commands::Command;
use config::{Config, DeliveryMode};
use db::Repository;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if !command.needs_config() {
        println!("{}", commands::USAGE);
        return Ok(());
    }

    // Load configuration
    let config = Config::load()?;

    match command {
        Command::RunDigest => run_digest(&config).await,
        Command::Help => Ok(()),
        Command::ListModels => commands::list_models(&config).await,
        Command::SubscriberStats => {
            let repository = Repository::open_uri(&config.store_uri).await?;
            commands::print_subscriber_stats(&repository).await
        }
        Command::ReactivateSubscribers => {
            let repository = Repository::open_uri(&config.store_uri).await?;
            commands::reactivate_subscribers(&repository).await?;
            commands::print_subscriber_stats(&repository).await
        }
        Command::ResetSubscribers(email) => {
            let repository = Repository::open_uri(&config.store_uri).await?;
            commands::reset_subscribers(&repository, &email).await?;
            commands::print_subscriber_stats(&repository).await
        }
        Command::AddSubscriber(email) => {
            let repository = Repository::open_uri(&config.store_uri).await?;
            if commands::add_subscriber(&repository, &email).await? {
                println!("Subscribed {}", email);
            } else {
                println!("{} was already subscribed and is active again", email);
            }
            Ok(())
        }
        Command::RemoveSubscriber(email) => {
            let repository = Repository::open_uri(&config.store_uri).await?;
            if repository.unsubscribe(&email).await? {
                println!("Unsubscribed {}", email);
            } else {
                println!("{} is not in the store", email);
            }
            Ok(())
        }
    }
}

async fn run_digest(config: &Config) -> Result<()> {
    // Abort before touching any service when a credential is missing
    let secrets = config.require_secrets()?;
    let mode = DeliveryMode::from_env();

    let app = App::new(config, &secrets, mode).await?;
    let report = app.run().await;
    report.log();

    if matches!(report.outcome, RunOutcome::CurationFailed(_)) {
        std::process::exit(1);
    }
    Ok(())
}
