use serde_json::json;

use crate::engine::scoring::ScoredItem;
use crate::models::NotificationPayload;

const TITLE_MAX_CHARS: usize = 60;
const BODY_MAX_CHARS: usize = 140;

/// Build the provider-agnostic message for a scored item. The `data`
/// object is opaque to the server: clients use it for deep linking and
/// analytics only.
pub fn compose(scored: &ScoredItem) -> NotificationPayload {
    let item = &scored.item;
    let prefix = item.brand.as_deref().unwrap_or(&item.source);

    NotificationPayload {
        title: format!("{}: {}", prefix, truncate(&item.title, TITLE_MAX_CHARS)),
        body: truncate(&item.summary, BODY_MAX_CHARS),
        data: json!({
            "type": "feed_suggestion",
            "item_id": item.id,
            "url": item.url,
            "score": scored.score,
            "reason": scored.reason.as_str(),
        }),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
