//! Tilt blending, funding and renormalization.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::config::{FundingRule, OverlayConfig};
use super::error::TiltbookError;

/// Largest accepted deviation of a renormalized weight vector from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Tilts in force on one date and the funding that pays for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveTiltSet {
    /// Signed tilt per event symbol.
    pub tilts: BTreeMap<String, f64>,
    /// Amount taken from each non-event symbol (same sign as the net tilt).
    pub funding: BTreeMap<String, f64>,
}

impl ActiveTiltSet {
    pub fn total_tilt(&self) -> f64 {
        self.tilts.values().sum()
    }

    pub fn total_funding(&self) -> f64 {
        self.funding.values().sum()
    }

    /// Net weight change per symbol: tilt on event symbols, minus funding
    /// on the rest.
    pub fn adjustments(&self) -> BTreeMap<String, f64> {
        let mut out = self.tilts.clone();
        for (symbol, amount) in &self.funding {
            *out.entry(symbol.clone()).or_insert(0.0) -= amount;
        }
        out
    }
}

/// Funds the net tilt out of every base symbol that carries no tilt.
///
/// Pro-rata funding takes `T * base_i / sum(base over non-event symbols)`;
/// equal funding takes `T / n`. When the non-event base has no weight,
/// pro-rata falls back to equal. With no non-event symbol at all the tilt
/// stays unfunded and renormalization absorbs it.
pub fn fund_tilts(
    base: &BTreeMap<String, f64>,
    tilts: BTreeMap<String, f64>,
    rule: FundingRule,
) -> ActiveTiltSet {
    let total: f64 = tilts.values().sum();
    let funders: Vec<(&String, f64)> = base
        .iter()
        .filter(|(symbol, w)| **w > 0.0 && !tilts.contains_key(*symbol))
        .map(|(symbol, w)| (symbol, *w))
        .collect();

    let mut funding = BTreeMap::new();
    if total != 0.0 && !funders.is_empty() {
        let funder_weight: f64 = funders.iter().map(|(_, w)| w).sum();
        let equal_share = total / funders.len() as f64;
        for (symbol, w) in &funders {
            let share = match rule {
                FundingRule::ProRata if funder_weight > 0.0 => total * w / funder_weight,
                _ => equal_share,
            };
            funding.insert((*symbol).clone(), share);
        }
    } else if total != 0.0 {
        tracing::debug!(total, "no non-event symbols to fund tilt");
    }

    ActiveTiltSet { tilts, funding }
}

/// Composite weights for one date, before leverage and regime scaling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    pub tilts: ActiveTiltSet,
    /// Renormalized long-only weights summing to 1.
    pub weights: BTreeMap<String, f64>,
}

/// Blends per-source tilts with frozen weights, caps, funds, and
/// renormalizes against the base allocation.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    blend_weights: Vec<f64>,
    tilt_cap: f64,
    funding: FundingRule,
}

impl OverlayCompositor {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            blend_weights: config.sources.iter().map(|s| s.blend_weight).collect(),
            tilt_cap: config.tilt_cap,
            funding: config.funding,
        }
    }

    /// `sum_k w_k * tilt_k` clipped to `[-tilt_cap, tilt_cap]` per symbol.
    ///
    /// `per_source` is indexed like the configured sources; extra entries
    /// are ignored.
    pub fn blend(&self, per_source: &[BTreeMap<String, f64>]) -> BTreeMap<String, f64> {
        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for (weight, tilts) in self.blend_weights.iter().zip(per_source) {
            if *weight == 0.0 {
                continue;
            }
            for (symbol, tilt) in tilts {
                *combined.entry(symbol.clone()).or_insert(0.0) += weight * tilt;
            }
        }
        combined
            .into_iter()
            .map(|(symbol, t)| (symbol, t.clamp(-self.tilt_cap, self.tilt_cap)))
            .filter(|(_, t)| *t != 0.0)
            .collect()
    }

    pub fn compose(
        &self,
        date: NaiveDate,
        base: &BTreeMap<String, f64>,
        per_source: &[BTreeMap<String, f64>],
    ) -> Result<Composite, TiltbookError> {
        let mut blended = self.blend(per_source);
        blended.retain(|symbol, _| {
            let known = base.contains_key(symbol);
            if !known {
                tracing::debug!(%date, %symbol, "dropping tilt on symbol outside base universe");
            }
            known
        });

        let tilts = fund_tilts(base, blended, self.funding);
        let mut raw = base.clone();
        for (symbol, delta) in tilts.adjustments() {
            *raw.entry(symbol).or_insert(0.0) += delta;
        }
        let weights = renormalize(date, raw)?;
        Ok(Composite { tilts, weights })
    }
}

/// Clips negatives to zero and rescales to sum to 1.
pub fn renormalize(
    date: NaiveDate,
    mut weights: BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, TiltbookError> {
    for w in weights.values_mut() {
        if *w < 0.0 {
            *w = 0.0;
        }
    }
    let sum: f64 = weights.values().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(TiltbookError::Renormalization { date, sum });
    }
    for w in weights.values_mut() {
        *w /= sum;
    }
    weights.retain(|_, w| *w > 0.0);

    let check: f64 = weights.values().sum();
    if (check - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(TiltbookError::Renormalization { date, sum: check });
    }
    Ok(weights)
}
