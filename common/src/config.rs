//! Shared environment-variable helpers and a thin `from_env` layer for the
//! canonical variables common to more than one binary.

use std::env;
use std::time::Duration;

pub fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

pub fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).ok().map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(default)
}

pub fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(key, default_secs))
}

pub fn env_csv(key: &str) -> Vec<String> {
    env::var(key)
    .ok()
    .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
    .unwrap_or_default()
}

/// Canonical configuration shared by every binary.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: String,
    pub internal_token: String,
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub cors_allow_origins: Vec<String>,
}

impl CoreConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = env_string("ENVIRONMENT", "dev");
        let internal_token = env_opt_string("INTERNAL_TOKEN").unwrap_or_default();
        if environment != "dev" && internal_token.is_empty() {
            eyre::bail!("INTERNAL_TOKEN is required outside the dev environment");
        }
        let cors_allow_origins = env_csv("CORS_ALLOW_ORIGINS");
        if environment != "dev" && cors_allow_origins.iter().any(|o| o == "*") {
            eyre::bail!("CORS_ALLOW_ORIGINS=* is forbidden outside the dev environment");
        }
        Ok(Self {
                environment,
                internal_token,
                redis_addr: env_string("REDIS_ADDR", "127.0.0.1:6379"),
                redis_password: env_opt_string("REDIS_PASSWORD"),
                cors_allow_origins,
        })
    }

    pub fn is_dev(&self) -> bool {
        self.environment == "dev"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u32_falls_back_on_missing() {
        assert_eq!(env_u32("XCORE_TEST_DOES_NOT_EXIST", 7), 7);
    }

    #[test]
    fn env_csv_splits_and_trims() {
        std::env::set_var("XCORE_TEST_CSV", "a, b,c");
        assert_eq!(env_csv("XCORE_TEST_CSV"), vec!["a", "b", "c"]);
        std::env::remove_var("XCORE_TEST_CSV");
    }
}
