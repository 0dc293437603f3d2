//! Parameter sweeps over frozen run configurations.
//!
//! Every combination is an independent run with its own event books and
//! scalers; workers share only the prepared market data. Results come back
//! in combination order whatever order the workers finish in.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backtest::{run_backtest, PreparedMarket};
use super::config::{FundingRule, RunConfig};
use super::metrics::PerformanceSummary;

/// Alternatives per swept parameter. An empty list keeps the base value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    pub target_vol: Vec<f64>,
    /// (min_leverage, max_leverage)
    pub leverage_bounds: Vec<(f64, f64)>,
    /// (dd_threshold_1, dd_threshold_2)
    pub dd_thresholds: Vec<(f64, f64)>,
    /// (dd_reduction_1, dd_reduction_2)
    pub dd_reductions: Vec<(f64, f64)>,
    /// Per-tier scales, one entry per configured regime threshold.
    pub regime_scales: Vec<Vec<f64>>,
    pub spike_zscore: Vec<f64>,
    pub tilt_cap: Vec<f64>,
    /// Blend weight per configured source, in source order.
    pub blend_weights: Vec<Vec<f64>>,
    /// Applied to every source.
    pub horizon: Vec<i64>,
    /// Applied to every source.
    pub tilt_size: Vec<f64>,
    pub funding: Vec<FundingRule>,
    pub base_bps: Vec<f64>,
}

/// One point of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepCombination {
    pub index: usize,
    /// (parameter, value) pairs that differ from the base config.
    pub params: Vec<(&'static str, String)>,
    pub config: RunConfig,
}

impl ParamGrid {
    /// Upper bound on the number of combinations, before validation.
    pub fn size(&self) -> usize {
        [
            self.target_vol.len(),
            self.leverage_bounds.len(),
            self.dd_thresholds.len(),
            self.dd_reductions.len(),
            self.regime_scales.len(),
            self.spike_zscore.len(),
            self.tilt_cap.len(),
            self.blend_weights.len(),
            self.horizon.len(),
            self.tilt_size.len(),
            self.funding.len(),
            self.base_bps.len(),
        ]
        .iter()
        .map(|n| (*n).max(1))
        .product()
    }

    /// Expands the cartesian product over `base`.
    ///
    /// Combinations that fail validation are dropped; the second value is
    /// how many were dropped.
    pub fn generate(&self, base: &RunConfig) -> (Vec<SweepCombination>, usize) {
        let mut points: Vec<(Vec<(&'static str, String)>, RunConfig)> =
            vec![(Vec::new(), base.clone())];

        expand(&mut points, "target_vol", &self.target_vol, |c, v| {
            c.risk.target_vol = *v
        });
        expand(&mut points, "leverage", &self.leverage_bounds, |c, (lo, hi)| {
            c.risk.min_leverage = *lo;
            c.risk.max_leverage = *hi;
        });
        expand(&mut points, "dd_thresholds", &self.dd_thresholds, |c, (t1, t2)| {
            c.risk.dd_threshold_1 = *t1;
            c.risk.dd_threshold_2 = *t2;
        });
        expand(&mut points, "dd_reductions", &self.dd_reductions, |c, (r1, r2)| {
            c.risk.dd_reduction_1 = *r1;
            c.risk.dd_reduction_2 = *r2;
        });
        expand(&mut points, "regime_scales", &self.regime_scales, |c, scales| {
            for (tier, scale) in c.regime.tiers.iter_mut().zip(scales) {
                tier.scale = *scale;
            }
        });
        expand(&mut points, "spike_zscore", &self.spike_zscore, |c, v| {
            c.regime.spike_zscore = *v
        });
        expand(&mut points, "tilt_cap", &self.tilt_cap, |c, v| c.overlay.tilt_cap = *v);
        expand(&mut points, "blend_weights", &self.blend_weights, |c, weights| {
            for (source, w) in c.overlay.sources.iter_mut().zip(weights) {
                source.blend_weight = *w;
            }
        });
        expand(&mut points, "horizon", &self.horizon, |c, v| {
            for source in &mut c.overlay.sources {
                source.horizon = *v;
            }
        });
        expand(&mut points, "tilt_size", &self.tilt_size, |c, v| {
            for source in &mut c.overlay.sources {
                source.tilt_size = *v;
            }
        });
        expand(&mut points, "funding", &self.funding, |c, v| c.overlay.funding = *v);
        expand(&mut points, "base_bps", &self.base_bps, |c, v| c.costs.base_bps = *v);

        let total = points.len();
        let combos: Vec<SweepCombination> = points
            .into_iter()
            .filter(|(params, config)| match config.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(?params, error = %e, "skipping invalid combination");
                    false
                }
            })
            .enumerate()
            .map(|(index, (params, config))| SweepCombination {
                index,
                params,
                config,
            })
            .collect();
        let invalid = total - combos.len();
        (combos, invalid)
    }
}

fn expand<T, F>(
    points: &mut Vec<(Vec<(&'static str, String)>, RunConfig)>,
    name: &'static str,
    values: &[T],
    apply: F,
) where
    T: std::fmt::Debug,
    F: Fn(&mut RunConfig, &T),
{
    if values.is_empty() {
        return;
    }
    let mut next = Vec::with_capacity(points.len() * values.len());
    for (params, config) in points.iter() {
        for value in values {
            let mut config = config.clone();
            apply(&mut config, value);
            let mut params = params.clone();
            params.push((name, format!("{value:?}")));
            next.push((params, config));
        }
    }
    *points = next;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    Completed(PerformanceSummary),
    Failed(String),
    /// Not started before cancellation.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub index: usize,
    pub params: Vec<(&'static str, String)>,
    pub outcome: SweepOutcome,
}

/// Sweep results in combination order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub rows: Vec<SweepRow>,
}

impl SweepReport {
    pub fn completed(&self) -> impl Iterator<Item = (&SweepRow, &PerformanceSummary)> {
        self.rows.iter().filter_map(|row| match &row.outcome {
            SweepOutcome::Completed(summary) => Some((row, summary)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.outcome == SweepOutcome::Skipped)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.outcome, SweepOutcome::Failed(_)))
            .count()
    }

    /// Completed row with the highest Sharpe ratio.
    pub fn best_by_sharpe(&self) -> Option<(&SweepRow, &PerformanceSummary)> {
        self.completed()
            .max_by(|a, b| a.1.sharpe_ratio.total_cmp(&b.1.sharpe_ratio))
    }
}

/// Runs sweep combinations, in parallel by default.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
    risk_free_rate: f64,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self {
            parallel: true,
            risk_free_rate: 0.0,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn run(
        &self,
        combos: &[SweepCombination],
        market: &PreparedMarket<'_>,
        cancel: Option<&AtomicBool>,
    ) -> SweepReport {
        self.run_with_progress(combos, market, cancel, |_, _| {})
    }

    /// Like [`ParamSweep::run`], calling `on_complete` after each finished
    /// combination with its index and total count.
    pub fn run_with_progress<F>(
        &self,
        combos: &[SweepCombination],
        market: &PreparedMarket<'_>,
        cancel: Option<&AtomicBool>,
        on_complete: F,
    ) -> SweepReport
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let total = combos.len();
        let job = |combo: &SweepCombination| {
            let outcome = if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                SweepOutcome::Skipped
            } else {
                let outcome = match run_backtest(&combo.config, market) {
                    Ok(result) => SweepOutcome::Completed(PerformanceSummary::from_result(
                        &result,
                        self.risk_free_rate,
                    )),
                    Err(e) => {
                        tracing::warn!(combination = combo.index, error = %e, "sweep run failed");
                        SweepOutcome::Failed(e.to_string())
                    }
                };
                on_complete(combo.index, total);
                outcome
            };
            SweepRow {
                index: combo.index,
                params: combo.params.clone(),
                outcome,
            }
        };

        let rows: Vec<SweepRow> = if self.parallel {
            combos.par_iter().map(job).collect()
        } else {
            combos.iter().map(job).collect()
        };

        let report = SweepReport { rows };
        tracing::info!(
            total,
            completed = report.completed().count(),
            skipped = report.skipped(),
            failed = report.failed(),
            "sweep finished"
        );
        report
    }
}
