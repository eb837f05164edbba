//! Quantity and metric engine for kubesnap
//!
//! Parses Kubernetes quantity strings ("500m", "2Gi") into plain numbers and
//! derives display-agnostic values from them: usage ratios, percentiles,
//! latency estimates, and byte/rate strings. Nothing here performs I/O.

mod format;
mod latency;
mod percentile;
mod quantity;
mod ratio;

pub use format::{format_bytes, format_cores, format_rate};
pub use latency::{
    LATENCY_CEILING_SECS, LATENCY_FLOOR_SECS, event_latency_secs, mentions_service,
    parse_duration_secs, pod_latency_secs,
};
pub use percentile::{percentile, sorted_samples};
pub use quantity::{parse_bytes, parse_cpu};
pub use ratio::{mean_pressure, usage_ratio};
