use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "aiclient:";
pub const DEFAULT_HEALTH_COOLDOWN_SECS: u64 = 6;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 5 * 60;
pub const DEFAULT_ACCOUNT_CACHE_TTL_SECS: u64 = 5;
pub const DEFAULT_MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;
pub const DEFAULT_MAX_CONNS: usize = 100;
pub const DEFAULT_SHUTDOWN_DEADLINE_SECS: u64 = 30;

/// Gateway-wide configuration — a `kiro.toml` file merged with `KIRO_*` env
/// var overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    pub redis_url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,
    /// Bearer token required on inbound requests. `None` disables auth checking.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_health_cooldown_secs")]
    pub health_cooldown_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: i64,
    #[serde(default = "default_account_cache_ttl_secs")]
    pub account_cache_ttl_secs: u64,
    #[serde(default = "default_max_request_body")]
    pub max_request_body: usize,
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_key_prefix: default_redis_key_prefix(),
            api_key: None,
            max_conns: default_max_conns(),
            log_level: default_log_level(),
            log_json: false,
            health_cooldown_secs: default_health_cooldown_secs(),
            max_retries: default_max_retries(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            account_cache_ttl_secs: default_account_cache_ttl_secs(),
            max_request_body: default_max_request_body(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_redis_key_prefix() -> String {
    DEFAULT_REDIS_KEY_PREFIX.to_string()
}
fn default_max_conns() -> usize {
    DEFAULT_MAX_CONNS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_health_cooldown_secs() -> u64 {
    DEFAULT_HEALTH_COOLDOWN_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_refresh_threshold_secs() -> i64 {
    DEFAULT_REFRESH_THRESHOLD_SECS
}
fn default_account_cache_ttl_secs() -> u64 {
    DEFAULT_ACCOUNT_CACHE_TTL_SECS
}
fn default_max_request_body() -> usize {
    DEFAULT_MAX_REQUEST_BODY
}
fn default_shutdown_deadline_secs() -> u64 {
    DEFAULT_SHUTDOWN_DEADLINE_SECS
}

impl GatewayConfig {
    /// Load config from an optional TOML file with `KIRO_*` env var overrides.
    ///
    /// `REDIS_URL` and `API_KEY` (unprefixed) are also honored directly, since
    /// those are the two values most commonly injected by process managers
    /// without the `KIRO_` prefix.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment
            .merge(Env::raw().only(&["REDIS_URL", "API_KEY"]))
            .merge(Env::prefixed("KIRO_").split("_"));

        figment
            .extract()
            .map_err(|e| crate::error::GatewayError::Config(e.to_string()))
    }
}
