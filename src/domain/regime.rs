//! Volatility-index regime guard.
//!
//! The guard reads only the index close strictly before the decision date.
//! The level picks an exposure tier; a separate z-score test on the index
//! (its day-over-day change by default) flags spikes, which cut exposure
//! further. The two factors multiply.

use chrono::NaiveDate;
use std::fmt;

use super::config::{RegimeConfig, SpikeBasis};
use super::market_data::VolIndexSeries;
use super::stats::zscore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegimeState {
    Normal,
    Elevated,
    High,
    Extreme,
}

impl RegimeState {
    /// State for the index of the highest tier reached, if any.
    fn from_tier(tier: Option<usize>) -> Self {
        match tier {
            None => RegimeState::Normal,
            Some(0) => RegimeState::Elevated,
            Some(1) => RegimeState::High,
            Some(_) => RegimeState::Extreme,
        }
    }
}

impl fmt::Display for RegimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegimeState::Normal => "normal",
            RegimeState::Elevated => "elevated",
            RegimeState::High => "high",
            RegimeState::Extreme => "extreme",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeReading {
    /// Index close used for the decision.
    pub level: Option<f64>,
    pub state: RegimeState,
    pub level_scale: f64,
    pub zscore: Option<f64>,
    pub spike: bool,
    /// `level_scale * spike_scale`.
    pub scale: f64,
}

impl RegimeReading {
    pub fn neutral() -> Self {
        Self {
            level: None,
            state: RegimeState::Normal,
            level_scale: 1.0,
            zscore: None,
            spike: false,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegimeGuard<'a> {
    config: RegimeConfig,
    series: &'a VolIndexSeries,
    /// Series the spike test runs on, aligned with `series` positions.
    basis: Vec<Option<f64>>,
}

impl<'a> RegimeGuard<'a> {
    pub fn new(config: &RegimeConfig, series: &'a VolIndexSeries) -> Self {
        let points = series.points();
        let basis = match config.spike_basis {
            SpikeBasis::Level => points.iter().map(|(_, v)| Some(*v)).collect(),
            SpikeBasis::Change => std::iter::once(None)
                .chain(points.windows(2).map(|w| Some(w[1].1 - w[0].1)))
                .take(points.len())
                .collect(),
        };
        Self {
            config: config.clone(),
            series,
            basis,
        }
    }

    /// Tier scale and state for an index level; inclusive lower bounds.
    pub fn level_scale(&self, level: f64) -> (f64, RegimeState) {
        let tier = self
            .config
            .tiers
            .iter()
            .rposition(|t| level >= t.threshold);
        let scale = tier.map_or(1.0, |i| self.config.tiers[i].scale);
        (scale, RegimeState::from_tier(tier))
    }

    /// Exposure scale for `date`.
    pub fn reading(&self, date: NaiveDate) -> RegimeReading {
        if !self.config.enabled {
            return RegimeReading::neutral();
        }
        let Some(pos) = self.series.position_before(date) else {
            return RegimeReading::neutral();
        };
        let level = self.series.points()[pos].1;
        let (level_scale, state) = self.level_scale(level);

        let zscore = if self.config.spike_enabled {
            self.spike_zscore(pos)
        } else {
            None
        };
        let spike = zscore.is_some_and(|z| z >= self.config.spike_zscore);
        let spike_scale = if spike {
            self.config.spike_reduction
        } else {
            1.0
        };

        RegimeReading {
            level: Some(level),
            state,
            level_scale,
            zscore,
            spike,
            scale: level_scale * spike_scale,
        }
    }

    /// Z-score of the basis value at `pos` against the trailing window that
    /// ends with it.
    fn spike_zscore(&self, pos: usize) -> Option<f64> {
        let current = self.basis.get(pos).copied().flatten()?;
        let lookback = self.config.spike_lookback;
        let start = (pos + 1).saturating_sub(lookback);
        let window: Vec<f64> = self.basis[start..=pos].iter().filter_map(|v| *v).collect();
        if window.len() < (lookback / 2).max(2) {
            return None;
        }
        zscore(current, &window)
    }
}
