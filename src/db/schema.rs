pub const SCHEMA: &str = r#"
-- one row per published day, keyed by ISO date text
CREATE TABLE IF NOT EXISTS apod (
    date TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    explanation TEXT NOT NULL,
    url TEXT NOT NULL,
    hd_url TEXT,
    media_type TEXT NOT NULL,
    copyright TEXT,
    thumbnail_url TEXT,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_apod_media_type ON apod(media_type);

-- cache_metadata table (maintenance bookkeeping)
CREATE TABLE IF NOT EXISTS cache_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
