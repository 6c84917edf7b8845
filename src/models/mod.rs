use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user interest profile. Profiles not touched within 30 days are
/// excluded from scoring entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestProfile {
    pub user_id: String,
    /// Topic name -> weight in [0, 1].
    pub topics: HashMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

impl InterestProfile {
    pub fn topic_weight(&self, topic: &str) -> f64 {
        self.topics.get(topic).copied().unwrap_or(0.0)
    }
}

/// Externally-ingested content item. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub brand: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestReason {
    GeneralInterest,
    MissionContext,
    LuxuryMatch,
}

impl SuggestReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestReason::GeneralInterest => "general_interest",
            SuggestReason::MissionContext => "mission_context",
            SuggestReason::LuxuryMatch => "luxury_match",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "mission_context" => SuggestReason::MissionContext,
            "luxury_match" => SuggestReason::LuxuryMatch,
            _ => SuggestReason::GeneralInterest,
        }
    }
}

/// A (user, item) proposal. The dedupe key is globally unique: once a row
/// exists, that item is never proposed to that user again, delivered or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedNotification {
    pub user_id: String,
    pub item_id: String,
    pub reason: SuggestReason,
    pub score: f64,
    pub dedupe_key: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Daily send cap per user. Rows keyed by (user_id, date); a row for a
/// different date simply never matches today, so the reset is lazy.
#[derive(Debug, Clone)]
pub struct NotificationQuota {
    pub user_id: String,
    pub date: String,
    pub sent_count: u32,
}

pub const DAILY_QUOTA: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    PendingDelete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PendingDelete => "pending_delete",
        }
    }
}

/// One registered push endpoint for a user. Created by the client
/// subscribe flow; marked pending-delete when the provider says Gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Provider-agnostic message. `data` is carried verbatim for client-side
/// deep linking and analytics, never read back by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}
