//! Latency estimation heuristics
//!
//! There is no tracing data behind these numbers. A pod's estimate grows with
//! its resource pressure, warning events and restarts; an event contributes
//! the duration it reports. The constants are kept as-is for compatibility.

use std::sync::LazyLock;

use regex::Regex;

/// Lowest estimate a pod can produce, in seconds
pub const LATENCY_FLOOR_SECS: f64 = 0.045;

/// Highest estimate a pod can produce, in seconds
pub const LATENCY_CEILING_SECS: f64 = 1.5;

const PRESSURE_WEIGHT: f64 = 0.25;
const WARNING_WEIGHT: f64 = 0.01;
const WARNING_CAP: u32 = 12;
const RESTART_WEIGHT: f64 = 0.004;
const RESTART_CAP: u32 = 20;

/// Matches "250ms", "1.2s", "took 30 ms"
static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(ms|s)\b").expect("valid regex"));

/// Estimated latency in seconds for a pod under the given pressure
pub fn pod_latency_secs(avg_pressure: f64, warnings: u32, restarts: u32) -> f64 {
    let estimate = LATENCY_FLOOR_SECS
        + PRESSURE_WEIGHT * avg_pressure
        + WARNING_WEIGHT * warnings.min(WARNING_CAP) as f64
        + RESTART_WEIGHT * restarts.min(RESTART_CAP) as f64;
    estimate.clamp(LATENCY_FLOOR_SECS, LATENCY_CEILING_SECS)
}

/// First duration mentioned in `text`, in seconds
pub fn parse_duration_secs(text: &str) -> Option<f64> {
    let caps = DURATION_REGEX.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();

    match unit.as_str() {
        "ms" => Some(value / 1000.0),
        "s" => Some(value),
        _ => None,
    }
}

/// Whether an event message refers to the named service
pub fn mentions_service(message: &str, service: &str) -> bool {
    !service.is_empty() && message.to_lowercase().contains(&service.to_lowercase())
}

/// Latency sample from an event message, if it names the service and a duration
pub fn event_latency_secs(message: &str, service: &str) -> Option<f64> {
    if !mentions_service(message, service) {
        return None;
    }
    parse_duration_secs(message)
}
