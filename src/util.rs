use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

const MONITOR_INTERVAL: &str = "MONITOR_INTERVAL";

const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

pub fn get_default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Poll interval override from the environment (milliseconds).
pub fn get_poll_interval_override() -> Option<Duration> {
    std::env::var(MONITOR_INTERVAL)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

const MONITOR_CONFIG: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./monitor.json";

pub fn get_config_path() -> String {
    std::env::var(MONITOR_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([-+]?\d+(?:\.\d+)?|[-+]?\.\d+)").expect("number pattern is valid")
});

/// Parse the leading number of a value like `"12.5%"`, `" 7 "` or `"3.25% used"`.
///
/// Returns `None` for sentinels such as `"N/A"` or an empty string.
pub fn parse_percent(raw: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}
