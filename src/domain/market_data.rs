//! Pre-loaded, read-only market inputs for a backtest run.
//!
//! Everything here is built once before the per-date loop starts and is
//! shared by reference across sweep workers.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::event::EventRow;
use super::timeline::Timeline;

/// One row of the price file.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: f64,
}

/// One row of the base-weight file.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightPoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub weight: f64,
}

/// One row of the optional ADV file.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvPoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub adv: f64,
}

/// Daily closes keyed by symbol then date.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    closes: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl PriceTable {
    pub fn from_points(points: Vec<PricePoint>) -> Self {
        let mut closes: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
        for p in points {
            closes.entry(p.symbol).or_default().insert(p.date, p.close);
        }
        Self { closes }
    }

    pub fn close(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.closes.get(symbol).and_then(|s| s.get(&date)).copied()
    }

    /// Trading timeline: every price date inside `[start, end]`.
    pub fn timeline(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Timeline {
        Timeline::new(
            self.closes
                .values()
                .flat_map(|s| s.keys().copied())
                .filter(|d| start.is_none_or(|s| *d >= s) && end.is_none_or(|e| *d <= e)),
        )
    }
}

/// Simple close-to-close returns aligned to a timeline.
///
/// Each return is measured from the symbol's last usable close, so a gap
/// books its whole move on the first session after it. `None` marks a
/// session whose own close is missing or non-positive.
#[derive(Debug, Clone, Default)]
pub struct ReturnMatrix {
    returns: HashMap<String, Vec<Option<f64>>>,
}

impl ReturnMatrix {
    pub fn build(prices: &PriceTable, timeline: &Timeline) -> Self {
        let dates = timeline.dates();
        let returns = prices
            .closes
            .iter()
            .map(|(symbol, series)| {
                let mut last_seen: Option<f64> = None;
                let out = dates
                    .iter()
                    .map(|d| {
                        let curr = series
                            .get(d)
                            .copied()
                            .filter(|c| c.is_finite() && *c > 0.0)?;
                        let r = last_seen.map(|prev| curr / prev - 1.0);
                        last_seen = Some(curr);
                        r
                    })
                    .collect();
                (symbol.clone(), out)
            })
            .collect();
        Self { returns }
    }

    pub fn get(&self, symbol: &str, session: usize) -> Option<f64> {
        self.returns
            .get(symbol)
            .and_then(|v| v.get(session))
            .copied()
            .flatten()
    }

    /// Non-missing returns in sessions `[end - window, end)`.
    pub fn trailing(&self, symbol: &str, end: usize, window: usize) -> Vec<f64> {
        let Some(series) = self.returns.get(symbol) else {
            return Vec::new();
        };
        let end = end.min(series.len());
        let start = end.saturating_sub(window);
        series[start..end].iter().filter_map(|r| *r).collect()
    }
}

/// Base allocation by rebalance date, forward-filled on lookup.
#[derive(Debug, Clone, Default)]
pub struct BaseWeights {
    by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl BaseWeights {
    pub fn from_points(points: Vec<WeightPoint>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
        for p in points {
            by_date.entry(p.date).or_default().insert(p.symbol, p.weight);
        }
        Self { by_date }
    }

    /// Latest allocation published on or before `date`.
    pub fn at(&self, date: NaiveDate) -> Option<&BTreeMap<String, f64>> {
        self.by_date.range(..=date).next_back().map(|(_, w)| w)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.by_date.keys().next().copied()
    }
}

/// Volatility-index closes in date order.
#[derive(Debug, Clone, Default)]
pub struct VolIndexSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl VolIndexSeries {
    pub fn new(mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.retain(|(_, v)| v.is_finite());
        points.sort_by_key(|(d, _)| *d);
        points.dedup_by_key(|(d, _)| *d);
        Self { points }
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    /// Position of the latest observation strictly before `date`.
    pub fn position_before(&self, date: NaiveDate) -> Option<usize> {
        self.points.partition_point(|(d, _)| *d < date).checked_sub(1)
    }
}

/// Average daily traded value per symbol.
#[derive(Debug, Clone, Default)]
pub struct AdvTable {
    by_symbol: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl AdvTable {
    pub fn from_points(points: Vec<AdvPoint>) -> Self {
        let mut by_symbol: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
        for p in points {
            by_symbol.entry(p.symbol).or_default().insert(p.date, p.adv);
        }
        Self { by_symbol }
    }

    /// Latest ADV observation strictly before `date`.
    pub fn before(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.by_symbol
            .get(symbol)
            .and_then(|s| s.range(..date).next_back())
            .map(|(_, v)| *v)
    }
}

/// All inputs a run needs, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub prices: PriceTable,
    pub base: BaseWeights,
    pub vol_index: VolIndexSeries,
    pub adv: Option<AdvTable>,
    /// Event rows keyed by source name.
    pub events: HashMap<String, Vec<EventRow>>,
}
