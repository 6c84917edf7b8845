pub const SCHEMA: &str = r#"
-- interest profiles table
CREATE TABLE IF NOT EXISTS interest_profiles (
    user_id TEXT PRIMARY KEY,
    topics TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_profiles_updated_at ON interest_profiles(updated_at DESC);

-- feed items table
CREATE TABLE IF NOT EXISTS feed_items (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    summary TEXT NOT NULL,
    tags TEXT NOT NULL,
    brand TEXT,
    published_at TEXT NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feed_items_published_at ON feed_items(published_at DESC);

-- push subscriptions table
CREATE TABLE IF NOT EXISTS push_subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    endpoint TEXT NOT NULL UNIQUE,
    p256dh TEXT NOT NULL,
    auth TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON push_subscriptions(user_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON push_subscriptions(status);

-- notification quotas table (lazy daily reset via the date column)
CREATE TABLE IF NOT EXISTS notification_quotas (
    user_id TEXT NOT NULL,
    date TEXT NOT NULL,
    sent_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, date)
);

-- suggested notifications table (dedupe_key uniqueness is the dedup gate)
CREATE TABLE IF NOT EXISTS suggested_notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    score REAL NOT NULL,
    dedupe_key TEXT NOT NULL UNIQUE,
    sent_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_suggestions_user_id ON suggested_notifications(user_id);
"#;
