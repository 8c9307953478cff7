use std::time::Duration;

use live::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Application settings read from the Rocket figment (`Rocket.toml` or
/// `ROCKET_*` environment variables). Every field has a default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL used in links inside emails.
    pub site_url: String,
    pub otp_ttl_minutes: i64,
    pub campaign_cache_secs: u64,
    pub options_cache_secs: u64,
    pub live_max_attempts: u32,
    pub live_retry_delay_ms: u64,
    pub live_poll_interval_ms: u64,
    pub live_subscribe_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            site_url: "http://localhost:8000".to_string(),
            otp_ttl_minutes: 10,
            campaign_cache_secs: 10 * 60,
            options_cache_secs: 5 * 60,
            live_max_attempts: 3,
            live_retry_delay_ms: 2_000,
            live_poll_interval_ms: 5_000,
            live_subscribe_timeout_ms: 10_000,
        }
    }
}

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.live_max_attempts,
            retry_delay: Duration::from_millis(self.live_retry_delay_ms),
            poll_interval: Duration::from_millis(self.live_poll_interval_ms),
            subscribe_timeout: Duration::from_millis(
                self.live_subscribe_timeout_ms,
            ),
        }
    }

    pub fn otp_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.otp_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_live_policy_defaults() {
        assert_eq!(AppConfig::default().retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"otp_ttl_minutes": 3}"#).unwrap();
        assert_eq!(config.otp_ttl_minutes, 3);
        assert_eq!(config.options_cache_secs, 300);
    }
}
