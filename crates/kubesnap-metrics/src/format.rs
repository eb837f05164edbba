const BYTE_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Convert bytes to a human-readable string using binary units.
///
/// # Examples
/// - 512 -> "512 B"
/// - 1536 -> "1.5 KiB"
/// - 1073741824 -> "1.0 GiB"
pub fn format_bytes(bytes: f64) -> String {
    if !bytes.is_finite() || bytes < 0.0 {
        return "-".to_string();
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", value.round() as u64)
    } else {
        format!("{:.1} {}", value, BYTE_UNITS[unit])
    }
}

/// Convert a byte rate to a human-readable string, e.g. "1.5 MiB/s"
pub fn format_rate(bytes_per_sec: f64) -> String {
    let formatted = format_bytes(bytes_per_sec);
    if formatted == "-" {
        formatted
    } else {
        format!("{formatted}/s")
    }
}

/// Convert cores to a short string: millicores below one core.
///
/// # Examples
/// - 0.25 -> "250m"
/// - 1.5 -> "1.5"
/// - 2.0 -> "2"
pub fn format_cores(cores: f64) -> String {
    if !cores.is_finite() || cores < 0.0 {
        return "-".to_string();
    }

    if cores < 1.0 {
        return format!("{}m", (cores * 1000.0).round() as u64);
    }

    let formatted = format!("{cores:.2}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
