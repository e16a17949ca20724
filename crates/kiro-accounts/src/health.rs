use chrono::{DateTime, TimeZone, Utc};
use kiro_store::StoreClient;
use tracing::info;

/// The upstream outcome that drives an account's health-state transition.
///
/// Recovery is passive — there is no background reaper walking the pool;
/// an unhealthy account becomes eligible again only when the selector
/// notices its cooldown or scheduled-recovery time has passed, and becomes
/// `healthy` again only on its next successful use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The upstream call succeeded.
    Success,
    /// Upstream returned 429 or 403 — rate-limited or forbidden.
    RateLimitedOrForbidden,
    /// Upstream returned 402 — quota exhausted for the billing period.
    QuotaExhausted,
    /// Upstream returned some other 400 not covered by a terminal client
    /// error (context-too-long, improperly-formed) — the model is likely
    /// unsupported for this account.
    UnsupportedModel,
}

/// Apply the health-tracker transition table for `outcome` to the account
/// identified by `account_uuid`.
pub async fn apply_outcome(
    store: &StoreClient,
    account_uuid: &str,
    outcome: Outcome,
) -> kiro_store::Result<()> {
    match outcome {
        Outcome::Success => {
            store.record_success_atomic(account_uuid).await?;
        }
        Outcome::RateLimitedOrForbidden => {
            info!(account_uuid, "marking account unhealthy (rate-limited/forbidden)");
            store.mark_unhealthy(account_uuid).await?;
        }
        Outcome::QuotaExhausted => {
            let recovery = first_day_next_month_utc(Utc::now());
            info!(account_uuid, %recovery, "marking account unhealthy with scheduled recovery (quota exhausted)");
            store
                .mark_unhealthy_with_recovery(account_uuid, recovery)
                .await?;
        }
        Outcome::UnsupportedModel => {
            info!(account_uuid, "marking account unhealthy (model likely unsupported)");
            store.mark_unhealthy(account_uuid).await?;
        }
    }
    Ok(())
}

/// First day of the month following `now`, at `00:00:00` UTC.
fn first_day_next_month_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Datelike;
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}
