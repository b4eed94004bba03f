use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::feed::extract_links;
use crate::models::{Category, ContentPool};

use super::gemini::GenerativeModel;
use super::retry::{RetryPolicy, Sleeper};

pub const READING_PICKS: usize = 3;
pub const LISTENING_PICKS: usize = 1;
pub const WATCHING_PICKS: usize = 1;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<h2[^>]*>\s*(READING|LISTENING|WATCHING)\s*</h2>").expect("heading pattern is valid")
});

const SECTION_HEADER: &str = r#"<div style="margin-bottom: 20px; border-bottom: 2px solid #000; padding-bottom: 5px;{extra}">
    <h2 style="font-size: 14px; letter-spacing: 2px; margin: 0;">{heading}</h2>
</div>"#;

const CARD: &str = r#"<div style="margin-bottom: 30px;">
    <div style="font-size: 11px; color: #888; font-weight: bold; margin-bottom: 5px;">[SOURCE NAME]</div>
    <div style="font-size: 18px; font-weight: bold; margin-bottom: 5px;">
        <a href="[LINK]" style="color: #000; text-decoration: none;">[TITLE]</a>
    </div>
    <div style="font-size: 14px; color: #444; line-height: 1.5;">[PUNCHY SUMMARY]</div>
</div>"#;

/// What to do when the model's HTML does not have the expected sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputValidation {
    Off,
    #[default]
    Warn,
    Abort,
}

/// Selects and formats the digest by prompting a generative model.
pub struct Curator {
    model: Box<dyn GenerativeModel>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl Curator {
    pub fn new(model: Box<dyn GenerativeModel>, policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            model,
            policy,
            sleeper,
        }
    }

    /// Ask the model for a digest built from an already-sampled pool.
    ///
    /// The returned text is passed through untouched.
    pub async fn curate(&self, sample: &ContentPool) -> Result<String> {
        if !sample.has_reading() {
            return Err(AppError::NotEnoughContent);
        }

        let prompt = build_prompt(sample);
        let model = self.model.as_ref();
        let prompt = prompt.as_str();

        tracing::info!(
            "Asking {} to curate {} candidates",
            model.model_name(),
            sample.total()
        );

        let text = self
            .policy
            .run(self.sleeper.as_ref(), move |attempt| {
                tracing::debug!("Curation attempt {}", attempt);
                model.generate(prompt)
            })
            .await?;

        tracing::info!("Curator returned {} characters", text.len());
        Ok(text)
    }
}

/// Render the candidate list and the fixed-format editorial instruction.
pub fn build_prompt(sample: &ContentPool) -> String {
    let mut candidates = String::new();
    for category in Category::ALL {
        let _ = writeln!(candidates, "--- {} OPTIONS ---", category.heading());
        for (i, entry) in sample.get(category).iter().enumerate() {
            let _ = writeln!(
                candidates,
                "{}_{} | Source: {} | Title: {} | Link: {} | Summary: {}\n",
                category.tag(),
                i,
                entry.source,
                entry.title,
                entry.link,
                entry.summary
            );
        }
    }

    let section = |category: Category, extra: &str| {
        SECTION_HEADER
            .replace("{heading}", category.heading())
            .replace("{extra}", extra)
    };

    format!(
        r#"You are the editor of "Ask Your Mother," a weekly digest for a dad of children under 5.

TASK:
Curate the weekly issue by selecting exactly:
1. **{read} Reading Articles** (Max 1 from Reddit).
2. **{listen} Podcast Episode** (Listening).
3. **{watch} Video** (Watching).

Only use links that appear in the content pool. Do not invent links.

OUTPUT FORMAT (Strict HTML):

{reading_header}

[INSERT {read} READING ARTICLES HERE USING THIS CARD FORMAT:]
{card}

{listening_header}

[INSERT {listen} PODCAST HERE USING THE SAME CARD FORMAT]

{watching_header}

[INSERT {watch} VIDEO HERE USING THE SAME CARD FORMAT]

CONTENT POOL:
{candidates}"#,
        read = READING_PICKS,
        listen = LISTENING_PICKS,
        watch = WATCHING_PICKS,
        reading_header = section(Category::Read, ""),
        listening_header = section(Category::Listen, " margin-top: 40px;"),
        watching_header = section(Category::Watch, " margin-top: 40px;"),
        card = CARD,
        candidates = candidates,
    )
}

/// Card counts found under each section heading of a curated digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestShape {
    pub reading: usize,
    pub listening: usize,
    pub watching: usize,
}

impl DigestShape {
    pub fn inspect(html: &str) -> Self {
        let headings: Vec<_> = HEADING_RE
            .captures_iter(html)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                let name = cap.get(1)?.as_str().to_uppercase();
                Some((whole.end(), whole.start(), name))
            })
            .collect();

        let mut shape = DigestShape::default();
        for (i, (body_start, _, name)) in headings.iter().enumerate() {
            let body_end = headings.get(i + 1).map(|h| h.1).unwrap_or(html.len());
            let cards = extract_links(&html[*body_start..body_end]).len();
            match name.as_str() {
                "READING" => shape.reading += cards,
                "LISTENING" => shape.listening += cards,
                "WATCHING" => shape.watching += cards,
                _ => {}
            }
        }
        shape
    }

    pub fn is_complete(&self) -> bool {
        self.reading == READING_PICKS
            && self.listening == LISTENING_PICKS
            && self.watching == WATCHING_PICKS
    }
}

/// Apply the configured validation mode to curated HTML.
pub fn check_output(html: &str, mode: OutputValidation) -> Result<()> {
    if mode == OutputValidation::Off {
        return Ok(());
    }

    let shape = DigestShape::inspect(html);
    if shape.is_complete() {
        return Ok(());
    }

    let detail = format!(
        "expected {}/{}/{} read/listen/watch picks, found {}/{}/{}",
        READING_PICKS, LISTENING_PICKS, WATCHING_PICKS, shape.reading, shape.listening, shape.watching
    );
    match mode {
        OutputValidation::Abort => Err(AppError::InvalidDigest(detail)),
        _ => {
            tracing::warn!("Curated digest looks malformed: {}", detail);
            Ok(())
        }
    }
}
