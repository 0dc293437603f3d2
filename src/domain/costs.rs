//! Transaction cost estimation.
//!
//! Per symbol: `bps = base + adv_coeff * (notional / ADV) * 1e4 + vol_coeff *
//! realized_vol * 1e4`, clipped to `[min_cost_bps, max_cost_bps]`. The impact
//! term is dropped when ADV is unknown or non-positive.

use std::collections::{BTreeMap, BTreeSet};

use super::config::CostConfig;

/// Cost charged for one symbol on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub symbol: String,
    /// Absolute weight traded.
    pub trade_weight: f64,
    pub trade_notional: f64,
    pub cost_bps: f64,
    /// Currency cost.
    pub cost: f64,
}

/// All trading on one date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBreakdown {
    pub records: Vec<CostRecord>,
    /// Sum of absolute weight changes.
    pub turnover: f64,
    pub total_cost: f64,
    /// `total_cost / nav`.
    pub cost_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct TransactionCostModel {
    config: CostConfig,
}

impl TransactionCostModel {
    pub fn new(config: &CostConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn vol_lookback(&self) -> usize {
        self.config.vol_lookback
    }

    pub fn cost_bps(&self, trade_notional: f64, adv: Option<f64>, realized_vol: f64) -> f64 {
        let mut bps = self.config.base_bps;
        if let Some(adv) = adv.filter(|a| *a > 0.0 && a.is_finite()) {
            bps += self.config.adv_coeff * (trade_notional / adv) * 10_000.0;
        }
        if realized_vol.is_finite() && realized_vol > 0.0 {
            bps += self.config.vol_coeff * realized_vol * 10_000.0;
        }
        bps.clamp(self.config.min_cost_bps, self.config.max_cost_bps)
    }

    /// Prices the move from `held` to `target` at `nav`.
    ///
    /// Symbols in `excluded` are neither traded nor charged. `adv` and
    /// `vol` look up the per-symbol inputs for the date.
    pub fn estimate<A, V>(
        &self,
        held: &BTreeMap<String, f64>,
        target: &BTreeMap<String, f64>,
        nav: f64,
        excluded: &BTreeSet<String>,
        adv: A,
        vol: V,
    ) -> CostBreakdown
    where
        A: Fn(&str) -> Option<f64>,
        V: Fn(&str) -> f64,
    {
        let symbols: BTreeSet<&String> = held.keys().chain(target.keys()).collect();
        let mut out = CostBreakdown::default();

        for symbol in symbols {
            if excluded.contains(symbol) {
                continue;
            }
            let before = held.get(symbol).copied().unwrap_or(0.0);
            let after = target.get(symbol).copied().unwrap_or(0.0);
            let trade_weight = (after - before).abs();
            if trade_weight == 0.0 {
                continue;
            }
            out.turnover += trade_weight;
            if !self.config.enabled {
                continue;
            }

            let trade_notional = trade_weight * nav;
            let cost_bps = self.cost_bps(trade_notional, adv(symbol), vol(symbol));
            let cost = trade_notional * cost_bps / 10_000.0;
            out.total_cost += cost;
            out.records.push(CostRecord {
                symbol: symbol.clone(),
                trade_weight,
                trade_notional,
                cost_bps,
                cost,
            });
        }

        out.cost_fraction = if nav > 0.0 { out.total_cost / nav } else { 0.0 };
        out
    }
}
