use std::collections::HashSet;

use chrono::{DateTime, Local, Utc};

use crate::ai::{check_output, Curator, GeminiClient, OutputValidation, TokioSleeper};
use crate::config::{Config, DeliveryMode, Secrets};
use crate::db::{DedupStore, Repository};
use crate::error::Result;
use crate::feed::{FeedFetcher, FeedSource};
use crate::models::{ArchiveOutcome, Category, ContentPool, SampleLimits};
use crate::services::{strip_code_fences, Archiver, DigestTemplate, Mailer, SmtpMailer};

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The reading pool was empty; nothing was curated or sent.
    NotEnoughContent,
    /// The model call or output validation failed; nothing was sent.
    CurationFailed(String),
    Delivered {
        sent: usize,
        failed: Vec<String>,
        /// `None` in safe mode, or when nothing could be archived.
        archive: Option<ArchiveOutcome>,
    },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub pool_counts: Vec<(Category, usize)>,
    pub dedup_disabled: bool,
    pub failed_sources: Vec<String>,
    pub already_sent: usize,
    pub lookup_failures: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn log(&self) {
        let counts = self
            .pool_counts
            .iter()
            .map(|(category, n)| format!("{}={}", category, n))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            "Run finished: pool [{}], {} already sent, {} failed sources, dedup {}",
            counts,
            self.already_sent,
            self.failed_sources.len(),
            if self.dedup_disabled { "disabled" } else { "enabled" }
        );
        if self.lookup_failures > 0 {
            tracing::warn!(
                "Dedup partly degraded: {} archive lookups failed",
                self.lookup_failures
            );
        }
        match &self.outcome {
            RunOutcome::NotEnoughContent => tracing::info!("Not enough content found."),
            RunOutcome::CurationFailed(reason) => tracing::error!("Curation failed: {}", reason),
            RunOutcome::Delivered { sent, failed, archive } => {
                tracing::info!("Delivered {} emails, {} failed", sent, failed.len());
                if let Some(archive) = archive {
                    tracing::info!(
                        "Archived {} new links, {} duplicates",
                        archive.saved,
                        archive.skipped
                    );
                }
            }
        }
    }
}

pub struct App {
    mode: DeliveryMode,
    admin_email: Option<String>,
    sources: Vec<FeedSource>,
    sample_limits: SampleLimits,
    output_validation: OutputValidation,

    // Services
    repository: Option<Repository>,
    dedup: DedupStore,
    fetcher: FeedFetcher,
    curator: Curator,
    mailer: Box<dyn Mailer>,
    template: DigestTemplate,
    archiver: Archiver,
}

impl App {
    pub async fn new(config: &Config, secrets: &Secrets, mode: DeliveryMode) -> Result<Self> {
        let repository = match Repository::open_uri(&config.store_uri).await {
            Ok(repository) => Some(repository),
            Err(e) => {
                tracing::warn!("Store {} unavailable: {}", config.store_uri, e);
                None
            }
        };
        let dedup = DedupStore::new(repository.clone());

        let model = GeminiClient::new(secrets.gemini_api_key.clone(), config.gemini_model.clone())?;
        let curator = Curator::new(Box::new(model), config.retry_policy(), Box::new(TokioSleeper));

        let mailer = SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            &secrets.email_sender,
            &secrets.email_password,
        )?;

        Ok(Self {
            mode,
            admin_email: config.admin_address().map(str::to_string),
            sources: config.sources.all(),
            sample_limits: config.sample_limits,
            output_validation: config.output_validation,
            repository,
            dedup: dedup.clone(),
            fetcher: FeedFetcher::new(config.window_days)?,
            curator,
            mailer: Box::new(mailer),
            template: DigestTemplate::new(&config.unsubscribe_url, config.feedback_address()),
            archiver: Archiver::new(dedup),
        })
    }

    /// Fetch, curate, send and archive, one step after another.
    pub async fn run(&self) -> RunReport {
        tracing::info!(
            "Starting digest run in {} mode",
            match self.mode {
                DeliveryMode::Live => "LIVE",
                DeliveryMode::Safe => "safe",
            }
        );

        let now = Utc::now();
        let fetch = self.fetcher.build_pool(&self.sources, &self.dedup, now).await;
        let outcome = self.process_pool(&fetch.pool, now).await;

        RunReport {
            pool_counts: Category::ALL
                .into_iter()
                .map(|c| (c, fetch.pool.count(c)))
                .collect(),
            dedup_disabled: fetch.dedup_disabled,
            failed_sources: fetch.failed_sources,
            already_sent: fetch.already_sent,
            lookup_failures: fetch.lookup_failures,
            outcome,
        }
    }

    pub async fn process_pool(&self, pool: &ContentPool, now: DateTime<Utc>) -> RunOutcome {
        if !pool.has_reading() {
            return RunOutcome::NotEnoughContent;
        }

        let sample = pool.sample(&self.sample_limits, &mut rand::rng());
        let raw = match self.curator.curate(&sample).await {
            Ok(raw) => raw,
            Err(e) => return RunOutcome::CurationFailed(e.to_string()),
        };

        let fragment = strip_code_fences(&raw);
        if let Err(e) = check_output(&fragment, self.output_validation) {
            return RunOutcome::CurationFailed(e.to_string());
        }

        let recipients = self.resolve_recipients().await;
        if recipients.is_empty() {
            tracing::warn!("No recipients resolved, nothing to send");
        }

        let date = now.with_timezone(&Local).date_naive();
        let mut sent = 0;
        let mut failed = Vec::new();
        for recipient in &recipients {
            tracing::info!("Sending to {}...", recipient);
            let mail = self.template.compose(&fragment, recipient, date);
            match self.mailer.send(&mail).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::error!("Failed to send to {}: {}", recipient, e);
                    failed.push(recipient.clone());
                }
            }
        }

        let archive = match self.mode {
            DeliveryMode::Live if sent > 0 => match self.archiver.archive(&fragment, now).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::warn!("Memory error: {}", e);
                    None
                }
            },
            DeliveryMode::Live => {
                tracing::warn!("No delivery succeeded, archive left untouched");
                None
            }
            DeliveryMode::Safe => {
                tracing::info!("Safe mode: archive left untouched");
                None
            }
        };

        RunOutcome::Delivered {
            sent,
            failed,
            archive,
        }
    }

    /// Admin only in safe mode; active subscribers in live mode, falling back
    /// to the admin when the store cannot be read.
    async fn resolve_recipients(&self) -> Vec<String> {
        let admin: Vec<String> = self.admin_email.iter().cloned().collect();

        let candidates = match (self.mode, &self.repository) {
            (DeliveryMode::Safe, _) => admin,
            (DeliveryMode::Live, Some(repository)) => match repository.active_subscribers().await {
                Ok(subscribers) => subscribers.into_iter().map(|s| s.email).collect(),
                Err(e) => {
                    tracing::warn!("Error fetching subscribers, falling back to admin: {}", e);
                    admin
                }
            },
            (DeliveryMode::Live, None) => {
                tracing::warn!("Subscriber store unavailable, falling back to admin");
                admin
            }
        };

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty() && seen.insert(email.to_lowercase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{well_formed_digest, RecordingSleeper, RetryPolicy, ScriptedModel};
    use crate::error::AppError;
    use crate::feed::extract_links;
    use crate::models::FeedEntry;
    use crate::services::CapturingMailer;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[async_trait::async_trait]
    impl Mailer for Arc<CapturingMailer> {
        async fn send(&self, mail: &crate::services::OutgoingMail) -> Result<()> {
            self.as_ref().send(mail).await
        }
    }

    struct Harness {
        _dir: TempDir,
        app: App,
        model: Arc<ScriptedModel>,
        mailer: Arc<CapturingMailer>,
        repository: Repository,
    }

    async fn harness(
        mode: DeliveryMode,
        responses: Vec<Result<String>>,
        mailer: CapturingMailer,
        validation: OutputValidation,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::new(dir.path().join("store.db").to_str().unwrap())
            .await
            .unwrap();
        let dedup = DedupStore::new(Some(repository.clone()));
        let model = Arc::new(ScriptedModel::new(responses));
        let mailer = Arc::new(mailer);

        let app = App {
            mode,
            admin_email: Some("admin@example.com".to_string()),
            sources: Vec::new(),
            sample_limits: SampleLimits::default(),
            output_validation: validation,
            repository: Some(repository.clone()),
            dedup: dedup.clone(),
            fetcher: FeedFetcher::new(30).unwrap(),
            curator: Curator::new(
                Box::new(model.clone()),
                RetryPolicy::default(),
                Box::new(Arc::new(RecordingSleeper::default())),
            ),
            mailer: Box::new(mailer.clone()),
            template: DigestTemplate::new("https://unsub.example/", "admin@example.com"),
            archiver: Archiver::new(dedup),
        };

        Harness {
            _dir: dir,
            app,
            model,
            mailer,
            repository,
        }
    }

    fn pool(read: usize, listen: usize, watch: usize) -> ContentPool {
        let mut pool = ContentPool::new();
        for (category, count) in [(Category::Read, read), (Category::Listen, listen), (Category::Watch, watch)] {
            for n in 0..count {
                pool.push(FeedEntry {
                    title: format!("{} {}", category, n),
                    link: format!("https://{}.example/{}", category, n),
                    summary: "summary".to_string(),
                    source: "SOURCE".to_string(),
                    category,
                });
            }
        }
        pool
    }

    #[tokio::test]
    async fn live_run_mails_every_subscriber_and_archives_fragment_links() {
        let digest = well_formed_digest();
        let h = harness(
            DeliveryMode::Live,
            vec![Ok(format!("```html\n{}\n```", digest))],
            CapturingMailer::default(),
            OutputValidation::Abort,
        )
        .await;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            h.repository.add_subscriber(email).await.unwrap();
        }
        h.repository.unsubscribe("c@example.com").await.unwrap();

        let outcome = h.app.process_pool(&pool(5, 2, 2), Utc::now()).await;

        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(
            sent.iter().map(|m| m.to.as_str()).collect::<Vec<_>>(),
            vec!["a@example.com", "b@example.com"]
        );
        for mail in &sent {
            assert!(mail.html.contains(&digest));
            assert!(!mail.html.contains("```"));
            assert!(mail.html.contains(">Ask Your Mother</h1>"));
            assert!(mail.subject.starts_with("Ask Your Mother: "));
        }

        assert_eq!(
            outcome,
            RunOutcome::Delivered {
                sent: 2,
                failed: vec![],
                archive: Some(ArchiveOutcome { saved: 5, skipped: 0 }),
            }
        );
        assert_eq!(h.repository.archive_count().await.unwrap(), 5);
        for link in extract_links(&digest) {
            assert!(h.app.dedup.exists(&link).await);
        }
        assert!(!h.app.dedup.exists("https://unsub.example/").await);
    }

    #[tokio::test]
    async fn safe_mode_sends_only_to_admin_and_skips_archive() {
        let h = harness(
            DeliveryMode::Safe,
            vec![Ok(well_formed_digest())],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;
        h.repository.add_subscriber("a@example.com").await.unwrap();

        let outcome = h.app.process_pool(&pool(5, 2, 2), Utc::now()).await;

        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "admin@example.com");
        assert_eq!(
            outcome,
            RunOutcome::Delivered { sent: 1, failed: vec![], archive: None }
        );
        assert_eq!(h.repository.archive_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_reading_pool_skips_everything() {
        let h = harness(
            DeliveryMode::Live,
            vec![Ok(well_formed_digest())],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;
        h.repository.add_subscriber("a@example.com").await.unwrap();

        let outcome = h.app.process_pool(&pool(0, 2, 2), Utc::now()).await;

        assert_eq!(outcome, RunOutcome::NotEnoughContent);
        assert!(h.model.prompts.lock().unwrap().is_empty());
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(h.repository.archive_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn curation_failure_sends_nothing() {
        let h = harness(
            DeliveryMode::Live,
            vec![Err(AppError::GenerativeApi("boom".into()))],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;
        h.repository.add_subscriber("a@example.com").await.unwrap();

        let outcome = h.app.process_pool(&pool(5, 2, 2), Utc::now()).await;

        assert!(matches!(outcome, RunOutcome::CurationFailed(_)));
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(h.repository.archive_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_output_aborts_only_in_abort_mode() {
        let broken = "<p>no picks this week</p>".to_string();

        let strict = harness(
            DeliveryMode::Safe,
            vec![Ok(broken.clone())],
            CapturingMailer::default(),
            OutputValidation::Abort,
        )
        .await;
        let outcome = strict.app.process_pool(&pool(5, 2, 2), Utc::now()).await;
        assert!(matches!(outcome, RunOutcome::CurationFailed(_)));
        assert!(strict.mailer.sent.lock().unwrap().is_empty());

        let lenient = harness(
            DeliveryMode::Safe,
            vec![Ok(broken.clone())],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;
        lenient.app.process_pool(&pool(5, 2, 2), Utc::now()).await;
        let sent = lenient.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains(&broken));
    }

    #[tokio::test]
    async fn failed_recipient_does_not_stop_the_broadcast() {
        let h = harness(
            DeliveryMode::Live,
            vec![Ok(well_formed_digest())],
            CapturingMailer::failing_for(&["b@example.com"]),
            OutputValidation::Warn,
        )
        .await;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            h.repository.add_subscriber(email).await.unwrap();
        }

        let outcome = h.app.process_pool(&pool(5, 2, 2), Utc::now()).await;

        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(
            sent.iter().map(|m| m.to.as_str()).collect::<Vec<_>>(),
            vec!["a@example.com", "c@example.com"]
        );
        match outcome {
            RunOutcome::Delivered { sent, failed, archive } => {
                assert_eq!(sent, 2);
                assert_eq!(failed, vec!["b@example.com".to_string()]);
                assert_eq!(archive.map(|a| a.saved), Some(5));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn nothing_is_archived_when_every_send_fails() {
        let h = harness(
            DeliveryMode::Live,
            vec![Ok(well_formed_digest())],
            CapturingMailer::failing_for(&["a@example.com"]),
            OutputValidation::Warn,
        )
        .await;
        h.repository.add_subscriber("a@example.com").await.unwrap();

        let outcome = h.app.process_pool(&pool(5, 2, 2), Utc::now()).await;

        assert_eq!(
            outcome,
            RunOutcome::Delivered {
                sent: 0,
                failed: vec!["a@example.com".to_string()],
                archive: None,
            }
        );
        assert_eq!(h.repository.archive_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn live_mode_without_store_falls_back_to_admin() {
        let mut h = harness(
            DeliveryMode::Live,
            vec![Ok(well_formed_digest())],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;
        h.app.repository = None;
        h.app.dedup = DedupStore::disabled();
        h.app.archiver = Archiver::new(DedupStore::disabled());

        let outcome = h.app.process_pool(&pool(3, 1, 1), Utc::now()).await;

        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "admin@example.com");
        assert_eq!(
            outcome,
            RunOutcome::Delivered { sent: 1, failed: vec![], archive: None }
        );
    }

    #[tokio::test]
    async fn run_with_no_sources_reports_not_enough_content() {
        let h = harness(
            DeliveryMode::Live,
            vec![],
            CapturingMailer::default(),
            OutputValidation::Warn,
        )
        .await;

        let report = h.app.run().await;

        assert_eq!(report.outcome, RunOutcome::NotEnoughContent);
        assert!(!report.dedup_disabled);
        assert_eq!(report.lookup_failures, 0);
        assert!(report.pool_counts.iter().all(|(_, n)| *n == 0));
    }
}
