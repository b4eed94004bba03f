pub const SCHEMA: &str = r#"
-- articles table: links already sent in a digest
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    link TEXT NOT NULL UNIQUE,
    original_link TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'sent'
);

CREATE INDEX IF NOT EXISTS idx_articles_sent_at ON articles(sent_at DESC);

-- subscribers table: maintained by the signup form
CREATE TABLE IF NOT EXISTS subscribers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    active INTEGER NOT NULL DEFAULT 1,
    joined_at TEXT NOT NULL DEFAULT (datetime('now')),
    unsubscribed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_subscribers_active ON subscribers(active);
"#;
