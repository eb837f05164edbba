/// Sort samples ascending, dropping non-finite values
pub fn sorted_samples(mut samples: Vec<f64>) -> Vec<f64> {
    samples.retain(|s| s.is_finite());
    samples.sort_by(f64::total_cmp);
    samples
}

/// Percentile of ascending `sorted` samples by linear interpolation.
///
/// `q` is a fraction in `[0, 1]`; the value sits at `q * (n - 1)` and falls
/// between the two nearest ranks when that position is fractional.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !q.is_finite() {
        return None;
    }

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_interpolated_median() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        assert!(approx(percentile(&samples, 0.5).unwrap(), 0.25));
        assert!(approx(percentile(&samples, 1.0).unwrap(), 0.4));
        assert!(approx(percentile(&samples, 0.0).unwrap(), 0.1));
    }

    #[test]
    fn test_p95_interpolates_between_top_ranks() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        // position = 0.95 * 3 = 2.85
        assert!(approx(percentile(&samples, 0.95).unwrap(), 0.385));
    }

    #[test]
    fn test_single_sample() {
        assert_eq!(percentile(&[0.7], 0.95), Some(0.7));
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_sorted_samples_drops_nan() {
        let sorted = sorted_samples(vec![0.3, f64::NAN, 0.1, 0.2]);
        assert_eq!(sorted, vec![0.1, 0.2, 0.3]);
    }
}
