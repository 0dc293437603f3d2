//! Backtest orchestrator.
//!
//! One pass over the trading timeline. For each session the loop runs
//! tilt → blend → leverage → regime → final weights → cost → return, using
//! only information available through the prior close. The last session
//! force-closes every event so the book ends reconciled to base.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::config::RunConfig;
use super::costs::TransactionCostModel;
use super::error::TiltbookError;
use super::event::ClosedEvent;
use super::event_book::EventBook;
use super::market_data::{MarketData, ReturnMatrix};
use super::overlay::OverlayCompositor;
use super::regime::{RegimeGuard, RegimeState};
use super::risk::{DrawdownTracker, RiskScaler};
use super::stats::annualized_vol;
use super::timeline::Timeline;

/// Market data aligned to a run's date range.
///
/// Built once and shared read-only by every run (and every sweep worker)
/// over the same range.
#[derive(Debug, Clone)]
pub struct PreparedMarket<'a> {
    pub data: &'a MarketData,
    pub timeline: Timeline,
    pub returns: ReturnMatrix,
}

impl<'a> PreparedMarket<'a> {
    /// The timeline starts no earlier than the first base allocation.
    pub fn new(
        data: &'a MarketData,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, TiltbookError> {
        let first_base = data
            .base
            .first_date()
            .ok_or_else(|| TiltbookError::data("base_weights", "no base weights loaded"))?;
        let effective_start = start.map_or(first_base, |s| s.max(first_base));

        let timeline = data.prices.timeline(Some(effective_start), end);
        if timeline.is_empty() {
            return Err(TiltbookError::EmptyTimeline {
                start: effective_start.to_string(),
                end: end.map_or_else(|| "end of data".to_string(), |e| e.to_string()),
            });
        }
        let returns = ReturnMatrix::build(&data.prices, &timeline);
        Ok(Self {
            data,
            timeline,
            returns,
        })
    }
}

/// One session of the daily ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub gross_return: f64,
    /// Cost as a fraction of the prior NAV.
    pub cost: f64,
    pub net_return: f64,
    pub nav: f64,
    pub leverage: f64,
    pub regime_scale: f64,
    pub regime_state: RegimeState,
    pub spike: bool,
    pub turnover: f64,
    pub drawdown: f64,
    pub active_events: usize,
    pub missing_prices: usize,
}

/// Final weight of one symbol on one session.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub weight_base: f64,
    /// Composite weight minus base weight, before leverage and regime.
    pub tilt_final: f64,
    pub weight_final: f64,
}

/// A closed event tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLedgerEntry {
    pub source: String,
    pub event: ClosedEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub records: Vec<DailyRecord>,
    pub weights: Vec<WeightRow>,
    pub event_history: Vec<EventLedgerEntry>,
}

impl BacktestResult {
    pub fn final_nav(&self) -> f64 {
        self.records
            .last()
            .map_or(self.initial_capital, |r| r.nav)
    }

    /// Final weights on `date`, keyed by symbol.
    pub fn weights_on(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.weights
            .iter()
            .filter(|w| w.date == date)
            .map(|w| (w.symbol.clone(), w.weight_final))
            .collect()
    }
}

pub fn run_backtest(
    config: &RunConfig,
    market: &PreparedMarket<'_>,
) -> Result<BacktestResult, TiltbookError> {
    let timeline = &market.timeline;
    let no_rows = Vec::new();

    let mut books = config
        .overlay
        .sources
        .iter()
        .map(|source| {
            let rows = market.data.events.get(&source.name).unwrap_or_else(|| {
                tracing::warn!(source = %source.name, "no event table loaded for source");
                &no_rows
            });
            EventBook::from_rows(timeline, source, rows)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let compositor = OverlayCompositor::new(&config.overlay);
    let scaler = RiskScaler::new(&config.risk);
    let guard = RegimeGuard::new(&config.regime, &market.data.vol_index);
    let cost_model = TransactionCostModel::new(&config.costs);

    let mut nav = config.initial_capital;
    let mut drawdown = DrawdownTracker::new(nav);
    let mut held: BTreeMap<String, f64> = BTreeMap::new();
    let mut composite_history: Vec<f64> = Vec::with_capacity(timeline.len());
    let mut records = Vec::with_capacity(timeline.len());
    let mut weight_rows = Vec::new();
    let last_session = timeline.len().saturating_sub(1);

    for (session, &date) in timeline.dates().iter().enumerate() {
        // Tilts
        for book in &mut books {
            if session == last_session {
                book.close_all(date);
            } else {
                book.roll(date);
            }
        }
        let per_source: Vec<BTreeMap<String, f64>> =
            books.iter().map(|b| b.active_tilts(date)).collect();
        let active_events = books.iter().map(|b| b.active_count(date)).sum();

        // Blend, fund, renormalize
        let base = market
            .data
            .base
            .at(date)
            .ok_or_else(|| TiltbookError::data("base_weights", format!("no allocation on {date}")))?;
        let composite = compositor.compose(date, base, &per_source)?;

        // Scalars from history through the prior close
        let leverage = scaler.leverage(&composite_history, drawdown.drawdown());
        let regime = guard.reading(date);
        let exposure = leverage.leverage * regime.scale;

        let target: BTreeMap<String, f64> = composite
            .weights
            .iter()
            .map(|(symbol, w)| (symbol.clone(), w * exposure))
            .collect();

        // Returns; a missing price earns zero and is not traded today
        let mut missing = BTreeSet::new();
        let mut gross = 0.0;
        let mut composite_return = 0.0;
        if session > 0 {
            for symbol in target.keys().chain(held.keys()) {
                if missing.contains(symbol) {
                    continue;
                }
                match market.returns.get(symbol, session) {
                    Some(r) => {
                        gross += target.get(symbol).copied().unwrap_or(0.0) * r;
                        composite_return += composite.weights.get(symbol).copied().unwrap_or(0.0) * r;
                    }
                    None => {
                        tracing::warn!(%date, %symbol, "missing price, treating return as zero");
                        missing.insert(symbol.clone());
                    }
                }
            }
        }

        // Costs on the move from yesterday's book, priced at the prior NAV
        let vol_window = cost_model.vol_lookback();
        let adv = market.data.adv.as_ref();
        let breakdown = cost_model.estimate(
            &held,
            &target,
            nav,
            &missing,
            |symbol| adv.and_then(|a| a.before(symbol, date)),
            |symbol| {
                annualized_vol(&market.returns.trailing(symbol, session, vol_window)).unwrap_or(0.0)
            },
        );

        let net = gross - breakdown.cost_fraction;
        nav *= 1.0 + net;
        let dd = drawdown.update(nav);
        composite_history.push(composite_return);

        tracing::debug!(
            %date,
            gross,
            cost = breakdown.cost_fraction,
            leverage = leverage.leverage,
            regime_scale = regime.scale,
            nav,
            "session complete"
        );

        let symbols: BTreeSet<&String> = base.keys().chain(composite.weights.keys()).collect();
        for symbol in symbols {
            let weight_base = base.get(symbol).copied().unwrap_or(0.0);
            let composite_weight = composite.weights.get(symbol).copied().unwrap_or(0.0);
            weight_rows.push(WeightRow {
                date,
                symbol: symbol.clone(),
                weight_base,
                tilt_final: composite_weight - weight_base,
                weight_final: target.get(symbol).copied().unwrap_or(0.0),
            });
        }

        records.push(DailyRecord {
            date,
            gross_return: gross,
            cost: breakdown.cost_fraction,
            net_return: net,
            nav,
            leverage: leverage.leverage,
            regime_scale: regime.scale,
            regime_state: regime.state,
            spike: regime.spike,
            turnover: breakdown.turnover,
            drawdown: dd,
            active_events,
            missing_prices: missing.len(),
        });

        // Untraded symbols keep yesterday's holding
        let mut next_held = target;
        for symbol in &missing {
            match held.get(symbol) {
                Some(w) => {
                    next_held.insert(symbol.clone(), *w);
                }
                None => {
                    next_held.remove(symbol);
                }
            }
        }
        held = next_held;
    }

    let event_history = config
        .overlay
        .sources
        .iter()
        .zip(&books)
        .flat_map(|(source, book)| {
            book.history().iter().map(|event| EventLedgerEntry {
                source: source.name.clone(),
                event: event.clone(),
            })
        })
        .collect();

    tracing::info!(
        sessions = timeline.len(),
        final_nav = nav,
        "backtest complete"
    );

    Ok(BacktestResult {
        initial_capital: config.initial_capital,
        records,
        weights: weight_rows,
        event_history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CostConfig, RegimeConfig, RiskConfig, SourceConfig};
    use crate::domain::event::EventRow;
    use crate::domain::market_data::{BaseWeights, PricePoint, PriceTable, WeightPoint};
    use approx::assert_relative_eq;
    use chrono::Days;

    fn d0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(i: u64) -> NaiveDate {
        d0() + Days::new(i)
    }

    fn flat_market(days: u64) -> MarketData {
        let mut prices = Vec::new();
        for i in 0..days {
            for symbol in ["A", "B"] {
                prices.push(PricePoint {
                    date: day(i),
                    symbol: symbol.into(),
                    close: 100.0,
                });
            }
        }
        MarketData {
            prices: PriceTable::from_points(prices),
            base: BaseWeights::from_points(vec![
                WeightPoint {
                    date: d0(),
                    symbol: "A".into(),
                    weight: 0.5,
                },
                WeightPoint {
                    date: d0(),
                    symbol: "B".into(),
                    weight: 0.5,
                },
            ]),
            ..MarketData::default()
        }
    }

    fn plain_config() -> RunConfig {
        RunConfig {
            risk: RiskConfig {
                enabled: false,
                ..RiskConfig::default()
            },
            regime: RegimeConfig {
                enabled: false,
                ..RegimeConfig::default()
            },
            costs: CostConfig {
                enabled: false,
                ..CostConfig::default()
            },
            ..RunConfig::default()
        }
    }

    #[test]
    fn timeline_starts_at_first_base_date() {
        let mut data = flat_market(5);
        data.base = BaseWeights::from_points(vec![WeightPoint {
            date: day(2),
            symbol: "A".into(),
            weight: 1.0,
        }]);
        let market = PreparedMarket::new(&data, None, None).unwrap();
        assert_eq!(market.timeline.first(), Some(day(2)));
    }

    #[test]
    fn empty_range_is_an_error() {
        let data = flat_market(5);
        let err = PreparedMarket::new(&data, Some(day(10)), Some(day(20))).unwrap_err();
        assert!(matches!(err, TiltbookError::EmptyTimeline { .. }));
    }

    #[test]
    fn no_events_tracks_base() {
        let data = flat_market(5);
        let market = PreparedMarket::new(&data, None, None).unwrap();
        let result = run_backtest(&plain_config(), &market).unwrap();

        assert_eq!(result.records.len(), 5);
        for r in &result.records {
            assert_relative_eq!(r.nav, 1_000_000.0);
            assert_eq!(r.active_events, 0);
        }
        let w = result.weights_on(day(3));
        assert_relative_eq!(w["A"], 0.5);
        assert_relative_eq!(w["B"], 0.5);
    }

    #[test]
    fn event_tilts_then_reverts_and_terminal_closes() {
        let mut data = flat_market(8);
        data.events.insert(
            "pead".into(),
            vec![EventRow {
                line: 2,
                event_date: day(1),
                symbol: "a".into(),
                signal_rank: 1.0,
                bucket: String::new(),
            }],
        );
        let mut source = SourceConfig::new("pead");
        source.horizon = 3;
        source.tilt_size = 0.10;
        let mut config = plain_config();
        config.overlay.tilt_cap = 0.5;
        config.overlay.sources.push(source);

        let market = PreparedMarket::new(&data, None, None).unwrap();
        let result = run_backtest(&config, &market).unwrap();

        // Known on day 1, live on days 2..=4.
        assert_relative_eq!(result.weights_on(day(1))["A"], 0.5, epsilon = 1e-12);
        for i in 2..=4 {
            let w = result.weights_on(day(i));
            assert_relative_eq!(w["A"], 0.6, epsilon = 1e-12);
            assert_relative_eq!(w["B"], 0.4, epsilon = 1e-12);
        }
        assert_relative_eq!(result.weights_on(day(5))["A"], 0.5, epsilon = 1e-12);
        assert_eq!(result.event_history.len(), 1);
        assert_eq!(result.event_history[0].source, "pead");
        assert!(!result.event_history[0].event.forced);
    }

    #[test]
    fn day_zero_charges_initial_build() {
        let data = flat_market(3);
        let market = PreparedMarket::new(&data, None, None).unwrap();
        let mut config = plain_config();
        config.costs.enabled = true;
        let result = run_backtest(&config, &market).unwrap();

        assert_relative_eq!(result.records[0].turnover, 1.0);
        assert!(result.records[0].cost > 0.0);
        assert_eq!(result.records[1].turnover, 0.0);
        assert_eq!(result.records[1].cost, 0.0);
    }

    #[test]
    fn missing_price_earns_zero_and_skips_cost() {
        let mut data = flat_market(4);
        let mut points: Vec<PricePoint> = Vec::new();
        for i in 0..4 {
            points.push(PricePoint {
                date: day(i),
                symbol: "A".into(),
                close: 100.0 * (1.0 + 0.01 * i as f64),
            });
            if i != 2 {
                points.push(PricePoint {
                    date: day(i),
                    symbol: "B".into(),
                    close: 100.0,
                });
            }
        }
        data.prices = PriceTable::from_points(points);
        let market = PreparedMarket::new(&data, None, None).unwrap();
        let result = run_backtest(&plain_config(), &market).unwrap();

        let r2 = &result.records[2];
        assert_eq!(r2.missing_prices, 1);
        assert_relative_eq!(r2.gross_return, 0.5 * (102.0 / 101.0 - 1.0), epsilon = 1e-12);
        // Day 3 measures B from its day-1 close.
        let r3 = &result.records[3];
        assert_eq!(r3.missing_prices, 0);
        assert_relative_eq!(r3.gross_return, 0.5 * (103.0 / 102.0 - 1.0), epsilon = 1e-12);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let data = flat_market(10);
        let market = PreparedMarket::new(&data, None, None).unwrap();
        let config = RunConfig::default();
        let a = run_backtest(&config, &market).unwrap();
        let b = run_backtest(&config, &market).unwrap();
        assert_eq!(a, b);
    }
}
