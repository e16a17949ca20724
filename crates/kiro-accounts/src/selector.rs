use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use kiro_core::error::GatewayError;
use kiro_core::types::Account;
use kiro_store::StoreClient;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Returned by [`AccountSelector::select`] when no account — healthy or
/// otherwise — is eligible, i.e. the pool is empty or every account is
/// disabled.
#[derive(Debug)]
pub struct NoHealthyAccounts;

impl fmt::Display for NoHealthyAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no healthy accounts available")
    }
}

impl std::error::Error for NoHealthyAccounts {}

impl From<NoHealthyAccounts> for GatewayError {
    fn from(_: NoHealthyAccounts) -> Self {
        GatewayError::Overloaded
    }
}

struct CachedAccounts {
    accounts: Vec<Account>,
    fetched_at: Instant,
}

/// Lock-free-per-request round robin over the healthy subset of the account
/// pool. "Lock-free" refers to the selection index, which is a store-side
/// atomic counter — the account list itself sits behind a reader-writer lock
/// that's only ever write-locked on a cache miss, which is rare relative to
/// the read rate.
pub struct AccountSelector {
    store: StoreClient,
    cache: RwLock<Option<CachedAccounts>>,
    cache_ttl: Duration,
    cooldown_secs: u64,
}

impl AccountSelector {
    pub fn new(store: StoreClient, cache_ttl: Duration, cooldown_secs: u64) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            cache_ttl,
            cooldown_secs,
        }
    }

    /// Produce one eligible account, excluding any uuid already tried by this
    /// request's dispatch loop.
    pub async fn select(&self, excluded: &HashSet<String>) -> Result<Account, GatewayError> {
        let accounts = self.accounts().await?;

        let now = Utc::now();
        let mut eligible: Vec<&Account> = accounts
            .iter()
            .filter(|a| !a.is_disabled)
            .filter(|a| {
                a.is_healthy
                    || a.recovery_due(now)
                    || (a.scheduled_recovery_time.is_none()
                        && a.cooldown_elapsed(self.cooldown_secs, now))
            })
            .collect();

        if eligible.is_empty() {
            // Fallback rule: "all unhealthy ≡ all healthy" — maximize
            // availability over correctness. Only non-disabled accounts
            // participate.
            let non_disabled: Vec<&Account> = accounts.iter().filter(|a| !a.is_disabled).collect();
            if non_disabled.is_empty() {
                return Err(NoHealthyAccounts.into());
            }
            warn!(
                count = non_disabled.len(),
                "all accounts unhealthy, falling back to full non-disabled set"
            );
            eligible = non_disabled;
        }

        let eligible: Vec<&Account> = eligible
            .into_iter()
            .filter(|a| !excluded.contains(&a.uuid))
            .collect();

        if eligible.is_empty() {
            return Err(NoHealthyAccounts.into());
        }

        let index = match self.store.increment_round_robin_counter().await {
            Ok(n) => (n as usize) % eligible.len(),
            Err(e) => {
                warn!(error = %e, "round-robin counter increment failed, using first eligible account");
                0
            }
        };

        Ok(eligible[index].clone())
    }

    async fn accounts(&self) -> Result<Vec<Account>, GatewayError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.accounts.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Re-check after acquiring the write lock in case another caller
        // already refreshed it while we were waiting.
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.accounts.clone());
            }
        }

        match self.store.get_all_accounts().await {
            Ok(accounts) => {
                debug!(count = accounts.len(), "refreshed account cache");
                *cache = Some(CachedAccounts {
                    accounts: accounts.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(accounts)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    warn!(error = %e, "account reload failed, serving stale cache");
                    Ok(cached.accounts.clone())
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use kiro_core::types::AuthMethod;

    fn account(uuid: &str, is_healthy: bool) -> Account {
        Account {
            uuid: uuid.to_string(),
            region: "us-east-1".to_string(),
            profile_arn: "arn:aws:test".to_string(),
            auth_method: AuthMethod::Social,
            is_healthy,
            is_disabled: false,
            last_error_time: None,
            scheduled_recovery_time: None,
            usage_count: 0,
            error_count: 0,
        }
    }

    #[test]
    fn cooldown_elapsed_true_without_last_error() {
        let a = account("a", false);
        assert!(a.cooldown_elapsed(6, Utc::now()));
    }

    #[test]
    fn cooldown_not_elapsed_within_window() {
        let mut a = account("a", false);
        a.last_error_time = Some(Utc::now());
        assert!(!a.cooldown_elapsed(6, Utc::now() + ChronoDuration::milliseconds(5999)));
    }

    #[test]
    fn cooldown_elapsed_at_exact_boundary() {
        let mut a = account("a", false);
        let error_time = Utc::now();
        a.last_error_time = Some(error_time);
        assert!(a.cooldown_elapsed(6, error_time + ChronoDuration::seconds(6)));
    }

    #[test]
    fn recovery_due_respects_scheduled_time() {
        let mut a = account("a", false);
        let recovery = Utc::now();
        a.scheduled_recovery_time = Some(recovery);
        assert!(!a.recovery_due(recovery - ChronoDuration::seconds(1)));
        assert!(a.recovery_due(recovery));
    }
}
