//! Performance summary of a daily ledger.

use chrono::NaiveDate;

use super::backtest::{BacktestResult, DailyRecord};
use super::stats::{mean, sample_std, TRADING_DAYS_PER_YEAR};

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub sessions: usize,
    pub final_nav: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_vol: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Positive fraction, e.g. 0.12 for a 12% peak-to-trough loss.
    pub max_drawdown: f64,
    /// Longest run of sessions spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub calmar_ratio: f64,
    /// Mean daily turnover times 252.
    pub annualized_turnover: f64,
    /// Mean daily cost fraction times 252.
    pub annualized_cost: f64,
    pub mean_leverage: f64,
    pub spike_days: usize,
}

impl PerformanceSummary {
    pub fn from_result(result: &BacktestResult, risk_free_rate: f64) -> Self {
        Self::compute(&result.records, result.initial_capital, risk_free_rate)
    }

    /// Summary of `records`, measured from `starting_nav`.
    pub fn compute(records: &[DailyRecord], starting_nav: f64, risk_free_rate: f64) -> Self {
        let sessions = records.len();
        let final_nav = records.last().map_or(starting_nav, |r| r.nav);

        let total_return = if starting_nav > 0.0 {
            final_nav / starting_nav - 1.0
        } else {
            0.0
        };

        let years = sessions as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns: Vec<f64> = records.iter().map(|r| r.net_return).collect();
        let navs: Vec<f64> = std::iter::once(starting_nav)
            .chain(records.iter().map(|r| r.nav))
            .collect();

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&navs);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (annualized_vol, sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, daily_rf);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let n = sessions.max(1) as f64;
        let annualized_turnover =
            records.iter().map(|r| r.turnover).sum::<f64>() / n * TRADING_DAYS_PER_YEAR;
        let annualized_cost =
            records.iter().map(|r| r.cost).sum::<f64>() / n * TRADING_DAYS_PER_YEAR;
        let mean_leverage = if sessions > 0 {
            records.iter().map(|r| r.leverage).sum::<f64>() / n
        } else {
            0.0
        };

        PerformanceSummary {
            start: records.first().map(|r| r.date),
            end: records.last().map(|r| r.date),
            sessions,
            final_nav,
            total_return,
            annualized_return,
            annualized_vol,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            calmar_ratio,
            annualized_turnover,
            annualized_cost,
            mean_leverage,
            spike_days: records.iter().filter(|r| r.spike).count(),
        }
    }
}

/// Named evaluation window, inclusive on both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSplit {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitSummary {
    pub name: String,
    pub summary: PerformanceSummary,
}

/// Summaries over each split, each measured from the NAV at the close
/// before the split's first session. Splits with no sessions are skipped.
pub fn split_summaries(
    result: &BacktestResult,
    splits: &[EvalSplit],
    risk_free_rate: f64,
) -> Vec<SplitSummary> {
    splits
        .iter()
        .filter_map(|split| {
            let first = result
                .records
                .partition_point(|r| r.date < split.start);
            let last = result.records.partition_point(|r| r.date <= split.end);
            if first >= last {
                return None;
            }
            let starting_nav = first
                .checked_sub(1)
                .map_or(result.initial_capital, |i| result.records[i].nav);
            Some(SplitSummary {
                name: split.name.clone(),
                summary: PerformanceSummary::compute(
                    &result.records[first..last],
                    starting_nav,
                    risk_free_rate,
                ),
            })
        })
        .collect()
}

fn compute_drawdown(navs: &[f64]) -> (f64, usize) {
    let Some(&first) = navs.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &nav in navs {
        if nav >= peak {
            peak = nav;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - nav) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

/// (annualized vol, Sharpe, Sortino) from daily returns.
fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64, f64) {
    let (Some(daily_mean), Some(stddev)) = (mean(returns), sample_std(returns)) else {
        return (0.0, 0.0, 0.0);
    };
    let annualized_vol = stddev * TRADING_DAYS_PER_YEAR.sqrt();

    let excess_return = daily_mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / returns.len() as f64).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (annualized_vol, sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::regime::RegimeState;
    use chrono::Days;

    fn records(navs: &[f64], start_nav: f64) -> Vec<DailyRecord> {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut prev = start_nav;
        navs.iter()
            .enumerate()
            .map(|(i, &nav)| {
                let r = nav / prev - 1.0;
                prev = nav;
                DailyRecord {
                    date: d0 + Days::new(i as u64),
                    gross_return: r,
                    cost: 0.0001,
                    net_return: r,
                    nav,
                    leverage: 1.0,
                    regime_scale: 1.0,
                    regime_state: RegimeState::Normal,
                    spike: false,
                    turnover: 0.1,
                    drawdown: 0.0,
                    active_events: 0,
                    missing_prices: 0,
                }
            })
            .collect()
    }

    fn result(navs: &[f64]) -> BacktestResult {
        BacktestResult {
            initial_capital: 100.0,
            records: records(navs, 100.0),
            weights: Vec::new(),
            event_history: Vec::new(),
        }
    }

    #[test]
    fn empty_ledger() {
        let s = PerformanceSummary::compute(&[], 100.0, 0.0);
        assert_eq!(s.sessions, 0);
        assert_eq!(s.final_nav, 100.0);
        assert_eq!(s.total_return, 0.0);
        assert_eq!(s.sharpe_ratio, 0.0);
    }

    #[test]
    fn total_return_from_starting_nav() {
        let s = PerformanceSummary::compute(&records(&[105.0, 110.0], 100.0), 100.0, 0.0);
        assert!((s.total_return - 0.10).abs() < 1e-12);
    }

    #[test]
    fn flat_year_has_zero_annualized_return() {
        let s = PerformanceSummary::compute(&records(&[100.0; 252], 100.0), 100.0, 0.0);
        assert!(s.annualized_return.abs() < 1e-12);
        assert_eq!(s.annualized_vol, 0.0);
    }

    #[test]
    fn max_drawdown_and_duration() {
        let s = PerformanceSummary::compute(
            &records(&[120.0, 90.0, 100.0, 130.0], 100.0),
            100.0,
            0.0,
        );
        assert!((s.max_drawdown - 0.25).abs() < 1e-12);
        assert_eq!(s.max_drawdown_duration, 2);
        assert!(s.calmar_ratio != 0.0);
    }

    #[test]
    fn sharpe_positive_for_rising_noisy_series() {
        let navs: Vec<f64> = (1..=60)
            .map(|i| 100.0 + i as f64 + if i % 2 == 0 { 0.5 } else { 0.0 })
            .collect();
        let s = PerformanceSummary::compute(&records(&navs, 100.0), 100.0, 0.0);
        assert!(s.sharpe_ratio > 0.0);
        assert!(s.annualized_vol > 0.0);
    }

    #[test]
    fn vol_and_sharpe_agree_with_shared_stats() {
        let navs = [101.0, 99.5, 102.0, 101.0, 104.0, 103.5];
        let recs = records(&navs, 100.0);
        let returns: Vec<f64> = recs.iter().map(|r| r.net_return).collect();
        let s = PerformanceSummary::compute(&recs, 100.0, 0.0);

        let vol = crate::domain::stats::annualized_vol(&returns).unwrap();
        assert!((s.annualized_vol - vol).abs() < 1e-12);
        let sharpe = mean(&returns).unwrap() / sample_std(&returns).unwrap()
            * TRADING_DAYS_PER_YEAR.sqrt();
        assert!((s.sharpe_ratio - sharpe).abs() < 1e-12);
    }

    #[test]
    fn sortino_zero_without_losses() {
        let s = PerformanceSummary::compute(&records(&[101.0, 102.0, 104.0], 100.0), 100.0, 0.0);
        assert_eq!(s.sortino_ratio, 0.0);
        assert!(s.sharpe_ratio > 0.0);
    }

    #[test]
    fn turnover_and_cost_annualize_daily_means() {
        let s = PerformanceSummary::compute(&records(&[100.0; 10], 100.0), 100.0, 0.0);
        assert!((s.annualized_turnover - 25.2).abs() < 1e-9);
        assert!((s.annualized_cost - 0.0252).abs() < 1e-12);
    }

    #[test]
    fn splits_measure_from_prior_close() {
        let r = result(&[110.0, 121.0, 133.1]);
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let splits = vec![
            EvalSplit {
                name: "train".into(),
                start: d0,
                end: d0,
            },
            EvalSplit {
                name: "test".into(),
                start: d0 + Days::new(1),
                end: d0 + Days::new(30),
            },
            EvalSplit {
                name: "later".into(),
                start: d0 + Days::new(100),
                end: d0 + Days::new(200),
            },
        ];
        let out = split_summaries(&r, &splits, 0.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].summary.sessions, 1);
        assert!((out[0].summary.total_return - 0.10).abs() < 1e-12);
        assert_eq!(out[1].name, "test");
        assert!((out[1].summary.total_return - 0.21).abs() < 1e-9);
    }
}
