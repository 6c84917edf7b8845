use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::db::Repository;
use crate::engine::scoring::ScoredItem;
use crate::error::Result;
use crate::models::{SuggestedNotification, DAILY_QUOTA};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The suggestion row has been claimed; delivery may proceed.
    Eligible { dedupe_key: String },
    /// This (user, item) pair was already proposed once. Permanent.
    Duplicate,
    /// Daily cap reached; skip the user for the rest of the run.
    QuotaExhausted,
}

/// Derived identifier tying one content item to one user, forever.
pub fn dedupe_key(user_id: &str, content_hash: &str) -> String {
    let digest = Sha256::digest(format!("{user_id}:{content_hash}").as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Decide whether the selected candidate may be queued for this user.
///
/// An `Eligible` decision has already consumed the dedupe key: the row is
/// inserted with `sent_at` null before any delivery is attempted, so a
/// failed delivery still never retries this pair.
pub async fn check(
    repo: &Repository,
    user_id: &str,
    today: &str,
    scored: &ScoredItem,
) -> Result<GateDecision> {
    let key = dedupe_key(user_id, &scored.item.content_hash);

    if repo.suggestion_exists(&key).await? {
        return Ok(GateDecision::Duplicate);
    }

    if repo.quota_for(user_id, today).await?.sent_count >= DAILY_QUOTA {
        return Ok(GateDecision::QuotaExhausted);
    }

    let inserted = repo
        .try_insert_suggestion(SuggestedNotification {
            user_id: user_id.to_string(),
            item_id: scored.item.id.clone(),
            reason: scored.reason,
            score: scored.score,
            dedupe_key: key.clone(),
            sent_at: None,
        })
        .await?;

    if inserted {
        Ok(GateDecision::Eligible { dedupe_key: key })
    } else {
        Ok(GateDecision::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedItem, SuggestReason};
    use chrono::Utc;

    fn scored(id: &str) -> ScoredItem {
        ScoredItem {
            item: FeedItem {
                id: id.to_string(),
                source: "newswire".to_string(),
                title: format!("Item {id}"),
                url: format!("https://news.example.com/{id}"),
                summary: "A summary".to_string(),
                tags: vec!["tech".to_string()],
                brand: None,
                published_at: Utc::now(),
                content_hash: format!("hash-{id}"),
            },
            score: 0.7,
            reason: SuggestReason::GeneralInterest,
        }
    }

    #[test]
    fn dedupe_key_is_stable_and_user_scoped() {
        let a = dedupe_key("user-1", "hash-a");
        assert_eq!(a, dedupe_key("user-1", "hash-a"));
        assert_ne!(a, dedupe_key("user-2", "hash-a"));
        assert_ne!(a, dedupe_key("user-1", "hash-b"));
    }

    #[tokio::test]
    async fn second_check_for_same_pair_is_duplicate() {
        let repo = Repository::open_in_memory().await.unwrap();
        let candidate = scored("a");

        let first = check(&repo, "user-1", "2026-08-30", &candidate).await.unwrap();
        assert!(matches!(first, GateDecision::Eligible { .. }));

        let second = check(&repo, "user-1", "2026-08-30", &candidate).await.unwrap();
        assert_eq!(second, GateDecision::Duplicate);
    }

    #[tokio::test]
    async fn duplicate_survives_quota_reset() {
        let repo = Repository::open_in_memory().await.unwrap();
        let candidate = scored("a");

        check(&repo, "user-1", "2026-08-29", &candidate).await.unwrap();
        // Next day, fresh quota, same pair
        let next_day = check(&repo, "user-1", "2026-08-30", &candidate).await.unwrap();
        assert_eq!(next_day, GateDecision::Duplicate);
    }

    #[tokio::test]
    async fn quota_cap_blocks_fourth_send() {
        let repo = Repository::open_in_memory().await.unwrap();
        for i in 0..3 {
            let decision = check(&repo, "user-1", "2026-08-30", &scored(&format!("i{i}")))
                .await
                .unwrap();
            assert!(matches!(decision, GateDecision::Eligible { .. }));
            repo.increment_quota("user-1", "2026-08-30").await.unwrap();
        }

        let fourth = check(&repo, "user-1", "2026-08-30", &scored("i3")).await.unwrap();
        assert_eq!(fourth, GateDecision::QuotaExhausted);
    }

    #[tokio::test]
    async fn stale_quota_row_reads_as_zero() {
        let repo = Repository::open_in_memory().await.unwrap();
        for _ in 0..3 {
            repo.increment_quota("user-1", "2026-08-29").await.unwrap();
        }

        let decision = check(&repo, "user-1", "2026-08-30", &scored("a")).await.unwrap();
        assert!(matches!(decision, GateDecision::Eligible { .. }));
    }
}
