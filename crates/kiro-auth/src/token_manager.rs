use std::time::Duration;

use chrono::Utc;
use kiro_core::error::GatewayError;
use kiro_core::types::{Account, AuthMethod, Token};
use kiro_store::StoreClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::singleflight::SingleFlight;

const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SocialRefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct IdcRefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
    #[serde(rename = "clientId")]
    client_id: &'a str,
    #[serde(rename = "clientSecret")]
    client_secret: &'a str,
    #[serde(rename = "grantType")]
    grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: i64,
}

/// Reads and refreshes account tokens, deduplicating concurrent refreshes of
/// the same account behind a per-uuid [`SingleFlight`] lock.
pub struct TokenManager {
    store: StoreClient,
    http: reqwest::Client,
    locks: SingleFlight<String>,
    refresh_threshold_secs: i64,
}

impl TokenManager {
    pub fn new(store: StoreClient, http: reqwest::Client, refresh_threshold_secs: i64) -> Self {
        Self {
            store,
            http,
            locks: SingleFlight::new(),
            refresh_threshold_secs,
        }
    }

    /// Return a token guaranteed fresh for at least `refresh_threshold_secs`,
    /// refreshing it first if necessary.
    pub async fn get_valid_token(&self, account: &Account) -> Result<Token, GatewayError> {
        let token = self
            .store
            .get_token(&account.uuid)
            .await
            .map_err(GatewayError::from)?;

        if token.is_fresh(self.refresh_threshold_secs, Utc::now()) {
            return Ok(token);
        }

        let _guard = self.locks.acquire(account.uuid.clone()).await;

        // Re-check: whoever held the lock before us may have already
        // refreshed this account's token.
        let token = self
            .store
            .get_token(&account.uuid)
            .await
            .map_err(GatewayError::from)?;
        if token.is_fresh(self.refresh_threshold_secs, Utc::now()) {
            debug!(account_uuid = %account.uuid, "token refreshed by a concurrent caller");
            return Ok(token);
        }

        debug!(account_uuid = %account.uuid, "refreshing token");
        let refreshed = refresh_token(&self.http, account, &token).await?;
        self.store
            .set_token(&account.uuid, &refreshed)
            .await
            .map_err(GatewayError::from)?;
        Ok(refreshed)
    }
}

/// Call the account's refresh endpoint (social or IDC/builder-id, per
/// `account.auth_method`) and build the new [`Token`] from its response.
async fn refresh_token(
    http: &reqwest::Client,
    account: &Account,
    current: &Token,
) -> Result<Token, GatewayError> {
    let resp = match account.auth_method {
        AuthMethod::Social => {
            let url = format!(
                "https://prod.{}.auth.desktop.kiro.dev/refreshToken",
                account.region
            );
            http.post(url)
                .timeout(REFRESH_TIMEOUT)
                .json(&SocialRefreshRequest {
                    refresh_token: &current.refresh_token,
                })
                .send()
                .await
        }
        AuthMethod::BuilderId => {
            let idc_region = current.idc_region.as_deref().unwrap_or(&account.region);
            let url = format!("https://oidc.{}.amazonaws.com/token", idc_region);
            http.post(url)
                .timeout(REFRESH_TIMEOUT)
                .json(&IdcRefreshRequest {
                    refresh_token: &current.refresh_token,
                    client_id: current.client_id.as_deref().unwrap_or_default(),
                    client_secret: current.client_secret.as_deref().unwrap_or_default(),
                    grant_type: "refresh_token",
                })
                .send()
                .await
        }
    };

    let resp = resp.map_err(|e| GatewayError::Upstream(format!("refresh request failed: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!(account_uuid = %account.uuid, %status, "token refresh rejected by upstream");
        return Err(GatewayError::Authentication(format!(
            "refresh failed ({status}): {body}"
        )));
    }

    let body: RefreshResponse = resp
        .json()
        .await
        .map_err(|e| GatewayError::Upstream(format!("malformed refresh response: {e}")))?;

    Ok(Token {
        access_token: body.access_token,
        refresh_token: body.refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
        expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        auth_method: current.auth_method,
        client_id: current.client_id.clone(),
        client_secret: current.client_secret.clone(),
        idc_region: current.idc_region.clone(),
    })
}
