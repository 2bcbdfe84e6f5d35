//! Equity-curve statistics for the status display: max drawdown and
//! per-tick return volatility.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::store::EquityPoint;

/// Summary statistics derived from the stored equity history.
#[derive(Debug, Clone, Default)]
pub struct EquityStats {
    /// Highest equity seen
    pub peak_equity: Decimal,

    /// Worst peak-to-trough decline, as a fraction of the peak (0 to 1)
    pub max_drawdown: f64,

    /// Mean per-tick return
    pub mean_return: f64,

    /// Standard deviation of per-tick returns
    pub return_volatility: f64,
}

/// Compute stats over an equity curve, oldest point first.
pub fn compute(points: &[EquityPoint]) -> EquityStats {
    let mut stats = EquityStats::default();

    if points.is_empty() {
        return stats;
    }

    // Peak-to-trough walk for max drawdown
    let mut peak = Decimal::ZERO;
    let mut max_dd_pct = 0.0f64;

    for point in points {
        if point.equity > peak {
            peak = point.equity;
        }

        if peak > Decimal::ZERO {
            let dd = peak - point.equity;
            let dd_pct = dd.to_f64().unwrap_or(0.0) / peak.to_f64().unwrap_or(1.0);
            if dd_pct > max_dd_pct {
                max_dd_pct = dd_pct;
            }
        }
    }

    stats.peak_equity = peak;
    stats.max_drawdown = max_dd_pct;

    // Per-tick returns
    if points.len() >= 2 {
        let returns: Vec<f64> = points
            .windows(2)
            .filter_map(|pair| {
                let prev = pair[0].equity.to_f64()?;
                let next = pair[1].equity.to_f64()?;
                if prev > 0.0 {
                    Some((next - prev) / prev)
                } else {
                    None
                }
            })
            .collect();

        if !returns.is_empty() {
            stats.mean_return = returns.clone().mean();
            if returns.len() >= 2 {
                stats.return_volatility = returns.std_dev();
            }
        }
    }

    stats
}
