use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One set of OAuth credentials for the upstream service.
///
/// Persisted as a hash field in the store (`pools:claude-kiro-oauth`); mutated
/// by the health tracker and the request handler, never by the translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uuid: String,
    pub region: String,
    pub profile_arn: String,
    pub auth_method: AuthMethod,
    #[serde(default = "default_true")]
    pub is_healthy: bool,
    #[serde(default)]
    pub is_disabled: bool,
    pub last_error_time: Option<DateTime<Utc>>,
    pub scheduled_recovery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub error_count: u64,
}

fn default_true() -> bool {
    true
}

impl Account {
    /// Whether `lastErrorTime + cooldown` has elapsed as of `now`.
    pub fn cooldown_elapsed(&self, cooldown_secs: u64, now: DateTime<Utc>) -> bool {
        match self.last_error_time {
            Some(t) => now >= t + chrono::Duration::seconds(cooldown_secs as i64),
            None => true,
        }
    }

    /// Whether a scheduled quota-exhaustion recovery time has passed.
    pub fn recovery_due(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_recovery_time {
            Some(t) => now >= t,
            None => false,
        }
    }
}

/// How an account authenticates against the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Social,
    BuilderId,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Social => write!(f, "social"),
            AuthMethod::BuilderId => write!(f, "builder-id"),
        }
    }
}

/// OAuth token material for one account, keyed by account uuid in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub auth_method: AuthMethod,
    /// Present only for `builder-id` accounts.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub idc_region: Option<String>,
}

impl Token {
    /// True if `expiresAt - now > threshold`, i.e. no refresh is needed yet.
    pub fn is_fresh(&self, threshold_secs: i64, now: DateTime<Utc>) -> bool {
        self.expires_at - now > chrono::Duration::seconds(threshold_secs)
    }
}
