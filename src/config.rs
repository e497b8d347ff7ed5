use std::env;
use std::time::Duration;

use tracing::warn;

use crate::http::RequestPolicy;
use crate::scheduler::SchedulerOptions;

pub(crate) const DEFAULT_API_BASE: &str = "https://api.dandanplay.net";
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime configuration of the overlay engine and its catalog client.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Config {
    pub(crate) api_base: String,
    pub(crate) app_id: Option<String>,
    pub(crate) app_secret: Option<String>,
    /// Simplified/traditional conversion requested from the catalog:
    /// 0 = none, 1 = to simplified, 2 = to traditional.
    pub(crate) ch_convert: u8,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
    pub(crate) cache_max_age: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) scheduler: SchedulerOptions,
}

impl Default for Config {
    fn default() -> Self {
        let policy = RequestPolicy::default();
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            app_id: None,
            app_secret: None,
            ch_convert: 0,
            connect_timeout: policy.connect_timeout,
            read_timeout: policy.read_timeout,
            attempts: policy.attempts,
            retry_delay: policy.retry_delay,
            cache_max_age: Duration::from_secs(12 * 60 * 60),
            poll_interval: DEFAULT_POLL_INTERVAL,
            scheduler: SchedulerOptions::default(),
        }
    }
}

impl Config {
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(base) = non_empty("DANMAKU_API_BASE") {
            config.api_base = base.trim().to_string();
        }
        config.app_id = non_empty("DANMAKU_APP_ID");
        config.app_secret = non_empty("DANMAKU_APP_SECRET");
        if let Some(raw) = non_empty("DANMAKU_CACHE_MAX_AGE_HOURS") {
            match raw.trim().parse::<u64>() {
                Ok(hours) => {
                    config.cache_max_age = Duration::from_secs(hours.saturating_mul(60 * 60))
                }
                Err(_) => warn!(value = %raw, "ignoring invalid DANMAKU_CACHE_MAX_AGE_HOURS"),
            }
        }
        if let Some(raw) = non_empty("DANMAKU_CH_CONVERT") {
            match raw.trim().parse::<u8>() {
                Ok(mode) if mode <= 2 => config.ch_convert = mode,
                _ => warn!(value = %raw, "ignoring invalid DANMAKU_CH_CONVERT"),
            }
        }
        if let Some(raw) = non_empty("DANMAKU_POLL_MS") {
            match raw.trim().parse::<u64>() {
                Ok(millis) if millis > 0 => config.poll_interval = Duration::from_millis(millis),
                _ => warn!(value = %raw, "ignoring invalid DANMAKU_POLL_MS"),
            }
        }
        config
    }

    pub(crate) fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            attempts: self.attempts,
            retry_delay: self.retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn environment_overrides_catalog_settings() {
        let config = Config::from_lookup(lookup_from(&[
            ("DANMAKU_API_BASE", " http://localhost:8080 "),
            ("DANMAKU_APP_ID", "app"),
            ("DANMAKU_APP_SECRET", ""),
            ("DANMAKU_CACHE_MAX_AGE_HOURS", "2"),
            ("DANMAKU_CH_CONVERT", "1"),
            ("DANMAKU_POLL_MS", "250"),
        ]));

        assert_eq!(config.api_base, "http://localhost:8080");
        assert_eq!(config.app_id.as_deref(), Some("app"));
        assert_eq!(config.app_secret, None);
        assert_eq!(config.cache_max_age, Duration::from_secs(7200));
        assert_eq!(config.ch_convert, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DANMAKU_CACHE_MAX_AGE_HOURS", "soon"),
            ("DANMAKU_CH_CONVERT", "9"),
            ("DANMAKU_POLL_MS", "0"),
        ]));

        assert_eq!(config.cache_max_age, Config::default().cache_max_age);
        assert_eq!(config.ch_convert, 0);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
