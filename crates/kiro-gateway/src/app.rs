use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use kiro_accounts::AccountSelector;
use kiro_auth::TokenManager;
use kiro_core::config::GatewayConfig;
use kiro_store::StoreClient;
use kiro_upstream::UpstreamClient;
use std::sync::Arc;

/// Central shared state, passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: GatewayConfig,
    pub store: StoreClient,
    pub selector: AccountSelector,
    pub token_manager: TokenManager,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: GatewayConfig, store: StoreClient, http: reqwest::Client) -> Self {
        let selector = AccountSelector::new(
            store.clone(),
            Duration::from_secs(config.account_cache_ttl_secs),
            config.health_cooldown_secs,
        );
        let token_manager = TokenManager::new(store.clone(), http.clone(), config.refresh_threshold_secs);
        let upstream = UpstreamClient::new(http);

        Self {
            config,
            store,
            selector,
            token_manager,
            upstream,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/messages", post(crate::http::messages::messages_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
