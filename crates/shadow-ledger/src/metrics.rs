//! Pure equity-curve math. Stateless, no DB, no async — ported from the
//! source stack's `portfolio-manager::shared_math` onto the subset the
//! Shadow Ledger needs (§4.12).

/// Sharpe ratio: (mean_return - rf_daily) / std * sqrt(252).
pub fn sharpe_ratio(returns: &[f64], rf_annual: f64) -> Option<f64> {
    if returns.len() < 3 {
        return None;
    }
    let rf_daily = rf_annual / 252.0;
    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let excess = mean - rf_daily;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev < 1e-12 {
        return None;
    }
    Some((excess / std_dev) * 252.0_f64.sqrt())
}

/// Max drawdown % and current drawdown % from an equity curve, as positive fractions.
pub fn max_drawdown(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = values[0];
    let mut max_dd = 0.0_f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    let current_dd = if peak > 0.0 { (peak - values[values.len() - 1]) / peak } else { 0.0 };
    (max_dd, current_dd)
}

pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return Vec::new();
    }
    values.windows(2).filter_map(|w| if w[0] != 0.0 { Some((w[1] - w[0]) / w[0]) } else { None }).collect()
}

/// Win rate over closed positions: fraction with pnl > 0.
pub fn win_rate(closed_pnls: &[f64]) -> Option<f64> {
    if closed_pnls.is_empty() {
        return None;
    }
    let wins = closed_pnls.iter().filter(|&&pnl| pnl > 0.0).count();
    Some(wins as f64 / closed_pnls.len() as f64)
}
