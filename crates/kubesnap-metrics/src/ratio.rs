/// Usage as a fraction of the limit, falling back to the request.
///
/// Returns `None` when neither a positive limit nor a positive request is
/// known. The result is always clamped to `[0, 1]`.
pub fn usage_ratio(usage: f64, request: Option<f64>, limit: Option<f64>) -> Option<f64> {
    if !usage.is_finite() {
        return None;
    }

    let denominator = match (limit, request) {
        (Some(limit), _) if limit > 0.0 => limit,
        (_, Some(request)) if request > 0.0 => request,
        _ => return None,
    };

    Some((usage / denominator).clamp(0.0, 1.0))
}

/// Mean of the ratios that could be derived, ignoring unknown ones
pub fn mean_pressure(ratios: &[Option<f64>]) -> Option<f64> {
    let known: Vec<f64> = ratios.iter().flatten().copied().collect();
    if known.is_empty() {
        return None;
    }
    Some(known.iter().sum::<f64>() / known.len() as f64)
}
