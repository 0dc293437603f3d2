//! Small statistics helpers shared by the risk, regime and cost models.

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator). `None` for fewer than two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Annualized sample volatility of daily returns.
pub fn annualized_vol(returns: &[f64]) -> Option<f64> {
    sample_std(returns).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Standard score of `value` against the sample in `window`.
///
/// `None` when the window has fewer than two points or zero dispersion.
pub fn zscore(value: f64, window: &[f64]) -> Option<f64> {
    let m = mean(window)?;
    let s = sample_std(window)?;
    if s > 0.0 && s.is_finite() {
        Some((value - m) / s)
    } else {
        None
    }
}
