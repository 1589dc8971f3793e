use std::time::Duration;

use ipnet::IpNet;
use xcore::config::{env_bool, env_csv, env_f64, env_string, env_u32, env_u64};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VerificationMode {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub core: xcore::config::CoreConfig,
    pub bind_addr: String,
    pub verification_mode: VerificationMode,
    pub time_window: Duration,
    pub verifier_base_url: String,
    pub verifier_legacy_empty_body_retry: bool,
    pub ip_rate_limit: u32,
    pub user_rate_limit: u32,
    pub rate_limit_window: Duration,
    pub trusted_proxy_cidrs: Vec<IpNet>,
    pub public_paths: Vec<String>,
    pub max_body_bytes: usize,
    pub upstream_base_url: String,
    pub market_data_base_url: String,
    pub metrics_token: Option<String>,
    pub price_protection_enabled: bool,
    pub price_protection_default_limit_rate: f64,
}

impl GatewayConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let core = xcore::config::CoreConfig::from_env()?;
        let mode = match env_string("SIGNATURE_VERIFICATION_MODE", "local").to_ascii_lowercase().as_str() {
            "remote" => VerificationMode::Remote,
            _ => VerificationMode::Local,
        };
        let trusted_proxy_cidrs = env_csv("TRUSTED_PROXY_CIDRS")
        .into_iter()
        .filter_map(|s| s.parse::<IpNet>().ok())
        .collect();
        let public_paths = {
            let mut v = env_csv("GATEWAY_PUBLIC_PATHS");
            if v.is_empty() {
                v = vec![
                    "/live".into(),
                    "/health".into(),
                    "/ready".into(),
                    "/metrics".into(),
                    "/v1/ping".into(),
                    "/v1/time".into(),
                    "/v1/exchangeInfo".into(),
                    "/v1/depth".into(),
                    "/v1/trades".into(),
                    "/v1/ticker".into(),
                    "/v1/auth/register".into(),
                    "/v1/auth/login".into(),
                    "/docs".into(),
                    "/openapi.yaml".into(),
                ];
            }
            v
        };
        Ok(Self {
                bind_addr: env_string("GATEWAY_BIND_ADDR", "0.0.0.0:8080"),
                verification_mode: mode,
                time_window: Duration::from_secs(env_u64("SIGNATURE_TIME_WINDOW_SECS", 30)),
                verifier_base_url: env_string("SIGNATURE_VERIFIER_URL", "http://127.0.0.1:9100"),
                verifier_legacy_empty_body_retry: env_bool("SIGNATURE_VERIFIER_LEGACY_EMPTY_BODY_RETRY", false),
                ip_rate_limit: env_u32("IP_RATE_LIMIT", 20),
                user_rate_limit: env_u32("USER_RATE_LIMIT", 50),
                rate_limit_window: Duration::from_secs(1),
                trusted_proxy_cidrs,
                public_paths,
                max_body_bytes: env_u32("GATEWAY_MAX_BODY_BYTES", 4 * 1024 * 1024) as usize,
                upstream_base_url: env_string("ORDER_SERVICE_URL", "http://127.0.0.1:8081"),
                market_data_base_url: env_string("MARKET_DATA_URL", "http://127.0.0.1:8083"),
                metrics_token: xcore::config::env_opt_string("METRICS_TOKEN"),
                price_protection_enabled: env_bool("PRICE_PROTECTION_ENABLED", true),
                price_protection_default_limit_rate: env_f64("PRICE_PROTECTION_DEFAULT_LIMIT_RATE", 0.05),
                core,
        })
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }
}
