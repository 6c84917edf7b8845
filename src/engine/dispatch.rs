use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::engine::compose::compose;
use crate::engine::gate::{self, GateDecision};
use crate::engine::scoring::select_best;
use crate::error::Result;
use crate::models::{FeedItem, InterestProfile};
use crate::push::PushSender;

const PROFILE_FRESHNESS_DAYS: i64 = 30;
const ITEM_FRESHNESS_HOURS: i64 = 24;

/// Run-scoped accumulator; all counters live here, never in process
/// globals.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub notifications_sent: usize,
    pub notifications_queued: usize,
    pub profiles_processed: usize,
    pub feed_items_available: usize,
}

/// One batch run: score -> gate -> compose -> fan out, one profile fully
/// resolved before the next. Mutual exclusion between runs is the external
/// scheduler's contract, not ours.
pub async fn run_dispatch(repo: &Repository, sender: &PushSender) -> Result<RunReport> {
    // Missing keys abort before any send
    sender.ensure_configured()?;

    let now = Utc::now();
    let profiles = repo
        .active_profiles(now - Duration::days(PROFILE_FRESHNESS_DAYS))
        .await?;
    let items = repo
        .recent_items(now - Duration::hours(ITEM_FRESHNESS_HOURS))
        .await?;

    let mut report = RunReport {
        feed_items_available: items.len(),
        ..Default::default()
    };

    let today = now.format("%Y-%m-%d").to_string();

    for profile in profiles {
        report.profiles_processed += 1;
        let user_id = profile.user_id.clone();
        if let Err(e) = process_profile(repo, sender, &profile, &items, &today, &mut report).await {
            // One user's failure never aborts the rest of the run
            warn!("Skipping user {user_id} after error: {e}");
        }
    }

    // Stale subscriptions queued during fan-out are removed here, outside
    // the send path
    let purged = repo.purge_pending_deletes().await?;
    if purged > 0 {
        info!("Purged {purged} stale subscriptions");
    }

    report.success = true;
    info!(
        "Dispatch run complete: {} queued, {} sent, {} profiles, {} items",
        report.notifications_queued,
        report.notifications_sent,
        report.profiles_processed,
        report.feed_items_available
    );
    Ok(report)
}

async fn process_profile(
    repo: &Repository,
    sender: &PushSender,
    profile: &InterestProfile,
    items: &[FeedItem],
    today: &str,
    report: &mut RunReport,
) -> Result<()> {
    let Some(best) = select_best(profile, items, Utc::now()) else {
        return Ok(());
    };

    let dedupe_key = match gate::check(repo, &profile.user_id, today, &best).await? {
        GateDecision::Duplicate => {
            debug!("Item {} already proposed to {}", best.item.id, profile.user_id);
            return Ok(());
        }
        GateDecision::QuotaExhausted => {
            debug!("Daily quota reached for {}", profile.user_id);
            return Ok(());
        }
        GateDecision::Eligible { dedupe_key } => dedupe_key,
    };

    // The dedupe key is consumed from here on, delivered or not
    report.notifications_queued += 1;

    let subscriptions = repo.subscriptions_for_user(&profile.user_id).await?;
    if subscriptions.is_empty() {
        debug!("No subscriptions for {}", profile.user_id);
        return Ok(());
    }

    let payload = compose(&best);
    let fanout = sender.fan_out(subscriptions, &payload).await;
    repo.mark_pending_delete(fanout.to_delete_ids.clone()).await?;

    if fanout.any_sent() {
        repo.mark_suggestion_sent(&dedupe_key, Utc::now()).await?;
        // Single quota write per user, after fan-out completes
        repo.increment_quota(&profile.user_id, today).await?;
        report.notifications_sent += 1;
    } else {
        debug!(
            "Delivery failed on all {} endpoints for {}",
            fanout.total_subscriptions, profile.user_id
        );
    }

    Ok(())
}
