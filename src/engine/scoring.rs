use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::models::{FeedItem, InterestProfile, SuggestReason};

/// Items at or below this score are never suggested.
pub const SCORE_THRESHOLD: f64 = 0.4;

const TAG_FACTOR: f64 = 0.5;
const BRAND_FACTOR: f64 = 0.3;
const RECENCY_FACTOR: f64 = 0.2;
const MISSION_BOOST: f64 = 0.3;
const LUXURY_BOOST: f64 = 0.2;

const MISSION_KEYWORDS: &[&str] = &["mission", "quest", "challenge", "reward", "expedition"];
const LUXURY_TAGS: &[&str] = &["luxury", "premium", "exclusive"];

#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: FeedItem,
    pub score: f64,
    pub reason: SuggestReason,
}

/// Score one item against one profile. Returns None for items that do not
/// clear the threshold.
pub fn score_item(
    profile: &InterestProfile,
    item: &FeedItem,
    now: DateTime<Utc>,
) -> Option<ScoredItem> {
    let tag_sum: f64 = item
        .tags
        .iter()
        .map(|tag| profile.topic_weight(&tag.to_lowercase()))
        .sum();

    let brand_weight = item
        .brand
        .as_deref()
        .map(|brand| profile.topic_weight(&brand.to_lowercase()))
        .unwrap_or(0.0);

    // Future-dated items count as just published, never above the cap
    let hours_since_publish = ((now - item.published_at).num_seconds() as f64 / 3600.0).max(0.0);
    let recency_boost = (1.0 - hours_since_publish / 24.0).max(0.0) * RECENCY_FACTOR;

    let mut score = tag_sum * TAG_FACTOR + brand_weight * BRAND_FACTOR + recency_boost;
    let mut reason = SuggestReason::GeneralInterest;

    let has_mission_tag = item
        .tags
        .iter()
        .any(|tag| MISSION_KEYWORDS.contains(&tag.to_lowercase().as_str()));
    if has_mission_tag {
        score += MISSION_BOOST;
        reason = SuggestReason::MissionContext;
    }

    let has_luxury_tag = item
        .tags
        .iter()
        .any(|tag| LUXURY_TAGS.contains(&tag.to_lowercase().as_str()));
    if profile.topic_weight("luxury") > 0.5 && has_luxury_tag {
        score += LUXURY_BOOST;
        // Mission context takes precedence when both boosts apply
        if reason == SuggestReason::GeneralInterest {
            reason = SuggestReason::LuxuryMatch;
        }
    }

    if score <= SCORE_THRESHOLD {
        return None;
    }

    Some(ScoredItem {
        item: item.clone(),
        score,
        reason,
    })
}

/// Pick the single best candidate for a profile: highest score, ties broken
/// by more recent publish time. At most one suggestion per user per run.
pub fn select_best(
    profile: &InterestProfile,
    items: &[FeedItem],
    now: DateTime<Utc>,
) -> Option<ScoredItem> {
    items
        .iter()
        .filter_map(|item| score_item(profile, item, now))
        .max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then(a.item.published_at.cmp(&b.item.published_at))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    fn profile(topics: &[(&str, f64)]) -> InterestProfile {
        InterestProfile {
            user_id: "user-1".to_string(),
            topics: topics
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
            updated_at: Utc::now(),
        }
    }

    fn item(id: &str, tags: &[&str], hours_old: i64) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            source: "newswire".to_string(),
            title: format!("Item {id}"),
            url: format!("https://news.example.com/{id}"),
            summary: "A summary".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            brand: None,
            published_at: Utc::now() - Duration::hours(hours_old),
            content_hash: format!("hash-{id}"),
        }
    }

    #[test]
    fn low_scoring_item_is_discarded() {
        let profile = profile(&[("travel", 0.2)]);
        let stale = item("a", &["travel"], 30);
        assert!(score_item(&profile, &stale, Utc::now()).is_none());
    }

    #[test]
    fn luxury_profile_matches_luxury_item() {
        let profile = profile(&[("luxury", 0.8)]);
        let candidate = item("a", &["luxury", "exclusive"], 1);

        let scored = score_item(&profile, &candidate, Utc::now()).unwrap();
        assert!(scored.score > SCORE_THRESHOLD);
        assert_eq!(scored.reason, SuggestReason::LuxuryMatch);
    }

    #[test]
    fn luxury_tags_without_luxury_interest_get_no_boost() {
        let profile = profile(&[("sports", 0.9)]);
        let plain = item("a", &["sports"], 1);
        let premium = item("b", &["sports", "premium"], 1);

        let a = score_item(&profile, &plain, Utc::now()).unwrap();
        let b = score_item(&profile, &premium, Utc::now()).unwrap();
        assert!((a.score - b.score).abs() < 1e-9);
        assert_eq!(b.reason, SuggestReason::GeneralInterest);
    }

    #[test]
    fn mission_keyword_boosts_and_sets_reason() {
        let profile = profile(&[("gaming", 0.5)]);
        let candidate = item("a", &["gaming", "quest"], 2);

        let scored = score_item(&profile, &candidate, Utc::now()).unwrap();
        assert_eq!(scored.reason, SuggestReason::MissionContext);
        // 0.5 * 0.5 tag + 0.3 mission + recency
        assert!(scored.score > 0.55);
    }

    #[test]
    fn mission_reason_wins_over_luxury() {
        let profile = profile(&[("luxury", 0.9)]);
        let candidate = item("a", &["luxury", "mission"], 1);

        let scored = score_item(&profile, &candidate, Utc::now()).unwrap();
        assert_eq!(scored.reason, SuggestReason::MissionContext);
    }

    #[test]
    fn brand_weight_contributes() {
        let profile = profile(&[("acme", 1.0), ("tech", 0.6)]);
        let mut branded = item("a", &["tech"], 1);
        branded.brand = Some("Acme".to_string());
        let unbranded = item("b", &["tech"], 1);

        let a = score_item(&profile, &branded, Utc::now()).unwrap();
        let b = score_item(&profile, &unbranded, Utc::now()).unwrap();
        assert!((a.score - b.score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn recency_boost_decays_to_zero() {
        let profile = profile(&[("tech", 1.0)]);
        let now = Utc::now();

        let fresh_item = FeedItem {
            published_at: now,
            ..item("a", &["tech"], 0)
        };
        let old_item = FeedItem {
            published_at: now - Duration::hours(24),
            ..item("b", &["tech"], 0)
        };
        let fresh = score_item(&profile, &fresh_item, now).unwrap();
        let old = score_item(&profile, &old_item, now).unwrap();
        assert!((fresh.score - old.score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn future_dated_items_do_not_exceed_the_recency_cap() {
        let profile = profile(&[("tech", 1.0)]);
        let now = Utc::now();

        let fresh = score_item(&profile, &item("a", &["tech"], 0), now).unwrap();
        let future = score_item(&profile, &item("b", &["tech"], -2), now).unwrap();
        assert!((future.score - fresh.score).abs() < 1e-6);
    }

    #[test]
    fn select_best_takes_highest_scorer() {
        let profile = profile(&[("tech", 0.9), ("travel", 0.6)]);
        let items = vec![item("a", &["travel"], 1), item("b", &["tech"], 1)];

        let best = select_best(&profile, &items, Utc::now()).unwrap();
        assert_eq!(best.item.id, "b");
    }

    #[test]
    fn select_best_breaks_ties_by_recency() {
        let profile = profile(&[("tech", 0.9)]);
        let now = Utc::now();
        let older = FeedItem {
            published_at: now - Duration::hours(26),
            ..item("a", &["tech"], 0)
        };
        let newer = FeedItem {
            published_at: now - Duration::hours(25),
            ..item("b", &["tech"], 0)
        };
        // Both past the recency window, identical scores
        let best = select_best(&profile, &[older, newer], now).unwrap();
        assert_eq!(best.item.id, "b");
    }

    #[test]
    fn select_best_returns_none_when_nothing_clears_threshold() {
        let profile = profile(&[("opera", 0.1)]);
        let items = vec![item("a", &["sports"], 20), item("b", &["weather"], 23)];
        assert!(select_best(&profile, &items, Utc::now()).is_none());
    }
}
