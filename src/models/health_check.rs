use std::time::Duration;
use serde::{Deserialize, Serialize};

fn default_retries() -> u32 {
    12
}

/// Docker health check attached to a host container at creation time.
/// Changing it means recreating the container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct HealthCheckSpec {
    pub(crate) test: Vec<String>,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    #[serde(default = "default_retries")]
    pub(crate) retries: u32,
    pub(crate) start_period: Duration,
}

impl HealthCheckSpec {
    pub(crate) fn new(test: Vec<String>, interval: Duration, timeout: Duration, retries: u32, start_period: Duration) -> Self {
        HealthCheckSpec { test, interval, timeout, retries, start_period }
    }

    /// Host is healthy once the admin timestamp endpoint answers.
    pub(crate) fn admin_timestamp(interval: Duration) -> Self {
        HealthCheckSpec::new(
            vec![
                "CMD-SHELL".to_string(),
                "curl --silent --fail http://localhost:8001/admin/v1/timestamp || exit 1".to_string(),
            ],
            interval,
            interval,
            default_retries(),
            interval,
        )
    }

    pub(crate) fn parse_duration(duration_str: &str) -> Result<Duration, String> {
        if duration_str.ends_with("ms") {
            let millis = duration_str[..duration_str.len() - 2]
                .parse::<u64>()
                .map_err(|_| format!("Invalid duration format: {}", duration_str))?;
            Ok(Duration::from_millis(millis))
        } else if duration_str.ends_with('s') {
            let seconds = duration_str[..duration_str.len() - 1]
                .parse::<u64>()
                .map_err(|_| format!("Invalid duration format: {}", duration_str))?;
            Ok(Duration::from_secs(seconds))
        } else if duration_str.ends_with('m') {
            let minutes = duration_str[..duration_str.len() - 1]
                .parse::<u64>()
                .map_err(|_| format!("Invalid duration format: {}", duration_str))?;
            Ok(Duration::from_secs(minutes * 60))
        } else {
            Err(format!("Invalid duration format: {}", duration_str))
        }
    }
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        HealthCheckSpec::admin_timestamp(Duration::from_secs(1))
    }
}
