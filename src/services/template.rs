use chrono::NaiveDate;

use super::mailer::OutgoingMail;

pub const NEWSLETTER_NAME: &str = "Ask Your Mother";
const TAGLINE: &str = "The Weekly Man-ual";

/// Branded wrapper placed around the curated fragment.
#[derive(Debug, Clone)]
pub struct DigestTemplate {
    unsubscribe_url: String,
    feedback_email: String,
}

impl DigestTemplate {
    pub fn new(unsubscribe_url: impl Into<String>, feedback_email: impl Into<String>) -> Self {
        Self {
            unsubscribe_url: unsubscribe_url.into(),
            feedback_email: feedback_email.into(),
        }
    }

    pub fn subject(date: NaiveDate) -> String {
        format!("{}: {}", NEWSLETTER_NAME, date.format("%b %d"))
    }

    pub fn unsubscribe_link(&self, recipient: &str) -> String {
        let separator = if self.unsubscribe_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}email={}",
            self.unsubscribe_url,
            separator,
            urlencoding::encode(recipient.trim())
        )
    }

    fn feedback_link(&self, verdict: &str) -> String {
        let subject = format!("{} feedback: {}", NEWSLETTER_NAME, verdict);
        format!("mailto:{}?subject={}", self.feedback_email, urlencoding::encode(&subject))
    }

    /// Full HTML document for one recipient. `fragment` must already be cleaned.
    pub fn render(&self, fragment: &str, recipient: &str) -> String {
        format!(
            r#"<html>
    <body style="font-family: Helvetica, Arial, sans-serif; max-width: 600px; margin: 0 auto; color: #333; padding: 20px;">
        <div style="text-align: center; padding-bottom: 40px;">
            <h1 style="margin: 0; font-size: 32px; letter-spacing: -1px; text-transform: uppercase;">{name}</h1>
            <p style="margin: 5px 0 0; color: #666; font-size: 11px; text-transform: uppercase; letter-spacing: 3px;">{tagline}</p>
        </div>

        {fragment}

        <div style="text-align: center; font-size: 13px; color: #666; padding-top: 40px;">
            How was this week's issue?
            <a href="{love}" style="color: #333;">Loved it</a> &middot;
            <a href="{meh}" style="color: #333;">Meh</a>
        </div>

        <div style="text-align: center; font-size: 11px; color: #aaa; padding-top: 50px; margin-top: 50px; border-top: 1px solid #eee;">
            Powered by Rust, Gemini &amp; Coffee<br>
            <a href="{unsubscribe}" style="color: #aaa;">Unsubscribe</a>
        </div>
    </body>
</html>
"#,
            name = NEWSLETTER_NAME,
            tagline = TAGLINE,
            fragment = fragment,
            love = self.feedback_link("Loved it"),
            meh = self.feedback_link("Meh"),
            unsubscribe = self.unsubscribe_link(recipient),
        )
    }

    pub fn compose(&self, fragment: &str, recipient: &str, date: NaiveDate) -> OutgoingMail {
        let html = self.render(fragment, recipient);
        OutgoingMail {
            to: recipient.to_string(),
            subject: Self::subject(date),
            text: plain_text(&html),
            html,
        }
    }
}

/// Remove markdown code-fence markers the model may wrap its HTML in.
pub fn strip_code_fences(content: &str) -> String {
    content
        .replace("```html", "")
        .replace("```HTML", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn plain_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 80) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Failed to convert digest to text: {}", e);
            String::new()
        }
    }
}
