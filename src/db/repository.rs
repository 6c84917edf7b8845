use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    FeedItem, InterestProfile, NotificationQuota, PushSubscription, SubscriptionStatus,
    SuggestReason, SuggestedNotification,
};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Interest profile store

    pub async fn upsert_profile(&self, profile: InterestProfile) -> Result<()> {
        let topics_json = serde_json::to_string(&profile.topics)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO interest_profiles (user_id, topics, updated_at)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(user_id) DO UPDATE SET
                           topics = excluded.topics,
                           updated_at = excluded.updated_at"#,
                    params![profile.user_id, topics_json, profile.updated_at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Profiles updated within the freshness window (30 days).
    pub async fn active_profiles(&self, cutoff: DateTime<Utc>) -> Result<Vec<InterestProfile>> {
        let cutoff = cutoff.to_rfc3339();
        let profiles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, topics, updated_at FROM interest_profiles
                     WHERE updated_at >= ?1 ORDER BY user_id",
                )?;
                let profiles = stmt
                    .query_map(params![cutoff], |row| Ok(profile_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(profiles)
            })
            .await?;
        Ok(profiles)
    }

    // Content feed store

    pub async fn upsert_item(&self, item: FeedItem) -> Result<()> {
        let tags_json = serde_json::to_string(&item.tags)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_items (id, source, title, url, summary, tags, brand, published_at, content_hash)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                       ON CONFLICT(id) DO NOTHING"#,
                    params![
                        item.id,
                        item.source,
                        item.title,
                        item.url,
                        item.summary,
                        tags_json,
                        item.brand,
                        item.published_at.to_rfc3339(),
                        item.content_hash,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Items published within the last 24 hours.
    pub async fn recent_items(&self, cutoff: DateTime<Utc>) -> Result<Vec<FeedItem>> {
        let cutoff = cutoff.to_rfc3339();
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source, title, url, summary, tags, brand, published_at, content_hash
                     FROM feed_items WHERE published_at >= ?1
                     ORDER BY published_at DESC",
                )?;
                let items = stmt
                    .query_map(params![cutoff], |row| Ok(item_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    // Subscription store

    pub async fn insert_subscription(
        &self,
        user_id: String,
        endpoint: String,
        p256dh: String,
        auth: String,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(endpoint) DO UPDATE SET
                           user_id = excluded.user_id,
                           p256dh = excluded.p256dh,
                           auth = excluded.auth,
                           status = 'active'"#,
                    params![user_id, endpoint, p256dh, auth],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        let user_id = user_id.to_string();
        let status = SubscriptionStatus::Active.as_str();
        let subscriptions = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, endpoint, p256dh, auth FROM push_subscriptions
                     WHERE user_id = ?1 AND status = ?2 ORDER BY id",
                )?;
                let subscriptions = stmt
                    .query_map(params![user_id, status], |row| Ok(subscription_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscriptions)
            })
            .await?;
        Ok(subscriptions)
    }

    /// Queue stale subscriptions for deletion without touching them in the
    /// send path.
    pub async fn mark_pending_delete(&self, ids: Vec<i64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let status = SubscriptionStatus::PendingDelete.as_str();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("UPDATE push_subscriptions SET status = ?1 WHERE id = ?2")?;
                for id in ids {
                    stmt.execute(params![status, id])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Physically remove everything queued for deletion. Follow-up step,
    /// never part of a fan-out.
    pub async fn purge_pending_deletes(&self) -> Result<usize> {
        let status = SubscriptionStatus::PendingDelete.as_str();
        let purged = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM push_subscriptions WHERE status = ?1",
                    params![status],
                )?;
                Ok(n)
            })
            .await?;
        Ok(purged)
    }

    // Quota store

    pub async fn quota_for(&self, user_id: &str, date: &str) -> Result<NotificationQuota> {
        let user = user_id.to_string();
        let day = date.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let count: Option<u32> = conn
                    .query_row(
                        "SELECT sent_count FROM notification_quotas WHERE user_id = ?1 AND date = ?2",
                        params![user, day],
                        |row| row.get(0),
                    )
                    .optional()?;
                // Absent or stale-dated rows read as zero
                Ok(count.unwrap_or(0))
            })
            .await?;
        Ok(NotificationQuota {
            user_id: user_id.to_string(),
            date: date.to_string(),
            sent_count: count,
        })
    }

    pub async fn increment_quota(&self, user_id: &str, date: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO notification_quotas (user_id, date, sent_count)
                       VALUES (?1, ?2, 1)
                       ON CONFLICT(user_id, date) DO UPDATE SET
                           sent_count = sent_count + 1"#,
                    params![user_id, date],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Dedup store

    pub async fn suggestion_exists(&self, dedupe_key: &str) -> Result<bool> {
        let dedupe_key = dedupe_key.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM suggested_notifications WHERE dedupe_key = ?1",
                    params![dedupe_key],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    /// Insert-if-absent keyed on `dedupe_key`. Returns false when the key
    /// is already taken; the UNIQUE constraint is the gate.
    pub async fn try_insert_suggestion(&self, suggestion: SuggestedNotification) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    r#"INSERT INTO suggested_notifications (user_id, item_id, reason, score, dedupe_key, sent_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        suggestion.user_id,
                        suggestion.item_id,
                        suggestion.reason.as_str(),
                        suggestion.score,
                        suggestion.dedupe_key,
                        suggestion.sent_at.map(|dt| dt.to_rfc3339()),
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(inserted)
    }

    pub async fn mark_suggestion_sent(
        &self,
        dedupe_key: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let dedupe_key = dedupe_key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE suggested_notifications SET sent_at = ?1 WHERE dedupe_key = ?2",
                    params![sent_at.to_rfc3339(), dedupe_key],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_suggestion(&self, dedupe_key: &str) -> Result<Option<SuggestedNotification>> {
        let dedupe_key = dedupe_key.to_string();
        let suggestion = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, item_id, reason, score, dedupe_key, sent_at
                     FROM suggested_notifications WHERE dedupe_key = ?1",
                )?;
                let suggestion = stmt
                    .query_row(params![dedupe_key], |row| Ok(suggestion_from_row(row)))
                    .optional()?;
                Ok(suggestion)
            })
            .await?;
        Ok(suggestion)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn profile_from_row(row: &Row) -> InterestProfile {
    InterestProfile {
        user_id: row.get(0).unwrap(),
        topics: serde_json::from_str(&row.get::<_, String>(1).unwrap()).unwrap_or_default(),
        updated_at: parse_datetime(&row.get::<_, String>(2).unwrap()).unwrap_or_else(Utc::now),
    }
}

fn item_from_row(row: &Row) -> FeedItem {
    FeedItem {
        id: row.get(0).unwrap(),
        source: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        url: row.get(3).unwrap(),
        summary: row.get(4).unwrap(),
        tags: serde_json::from_str(&row.get::<_, String>(5).unwrap()).unwrap_or_default(),
        brand: row.get(6).unwrap(),
        published_at: parse_datetime(&row.get::<_, String>(7).unwrap()).unwrap_or_else(Utc::now),
        content_hash: row.get(8).unwrap(),
    }
}

fn subscription_from_row(row: &Row) -> PushSubscription {
    PushSubscription {
        id: row.get(0).unwrap(),
        user_id: row.get(1).unwrap(),
        endpoint: row.get(2).unwrap(),
        p256dh: row.get(3).unwrap(),
        auth: row.get(4).unwrap(),
    }
}

fn suggestion_from_row(row: &Row) -> SuggestedNotification {
    SuggestedNotification {
        user_id: row.get(0).unwrap(),
        item_id: row.get(1).unwrap(),
        reason: SuggestReason::from_db_str(&row.get::<_, String>(2).unwrap()),
        score: row.get(3).unwrap(),
        dedupe_key: row.get(4).unwrap(),
        sent_at: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
    }
}
