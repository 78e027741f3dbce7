use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use hooks::dashboard::RefreshIntervals;

pub const DEFAULT_PREFERENCES_PATH: &str = "dashboard_preferences.json";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend address. Unset runs against the in-process mock API.
    pub api_base_url: Option<String>,
    pub api_timeout: Duration,
    pub intervals: RefreshIntervals,
    pub preferences_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let millis = |key: &str, default| -> anyhow::Result<Duration> {
            let Some(raw) = lookup(key) else {
                return Ok(default);
            };
            let ms: u64 = raw.trim().parse().with_context(|| {
                format!("{key} must be a number of milliseconds, got {raw:?}")
            })?;
            Ok(Duration::from_millis(ms))
        };

        let defaults = RefreshIntervals::default();
        Ok(Config {
            api_base_url: lookup("API_BASE_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            api_timeout: millis("API_TIMEOUT_MS", DEFAULT_API_TIMEOUT)?,
            intervals: RefreshIntervals {
                stats: millis("REFRESH_STATS_MS", defaults.stats)?,
                charts: millis("REFRESH_CHARTS_MS", defaults.charts)?,
                notifications: millis(
                    "REFRESH_NOTIFICATIONS_MS",
                    defaults.notifications,
                )?,
            },
            preferences_path: lookup("PREFERENCES_PATH")
                .unwrap_or_else(|| DEFAULT_PREFERENCES_PATH.to_string())
                .into(),
        })
    }
}
