#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use tiltbook::domain::config::{CostConfig, RegimeConfig, RiskConfig, RunConfig, SourceConfig};
use tiltbook::domain::error::TiltbookError;
pub use tiltbook::domain::event::EventRow;
pub use tiltbook::domain::market_data::{AdvPoint, MarketData, PricePoint, WeightPoint};
use tiltbook::ports::data_port::DataPort;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Calendar day `i` counted from 2024-01-01.
pub fn day(i: u64) -> NaiveDate {
    date(2024, 1, 1) + Days::new(i)
}

/// Every symbol closes at `close` on days `0..days`.
pub fn flat_prices(symbols: &[&str], days: u64, close: f64) -> Vec<PricePoint> {
    (0..days)
        .flat_map(|i| {
            symbols.iter().map(move |s| PricePoint {
                date: day(i),
                symbol: s.to_string(),
                close,
            })
        })
        .collect()
}

/// Symbol `i` compounds at `drift[i]` per day, with a small alternating
/// wobble so volatility is never zero.
pub fn drifting_prices(symbols: &[&str], drift: &[f64], days: u64) -> Vec<PricePoint> {
    let mut out = Vec::new();
    for (s, &mu) in symbols.iter().zip(drift) {
        let mut close = 100.0;
        for i in 0..days {
            out.push(PricePoint {
                date: day(i),
                symbol: s.to_string(),
                close,
            });
            let wobble = if i % 2 == 0 { 0.004 } else { -0.003 };
            close *= 1.0 + mu + wobble;
        }
    }
    out
}

/// Equal-weight allocation published on `on`.
pub fn equal_base(symbols: &[&str], on: NaiveDate) -> Vec<WeightPoint> {
    let w = 1.0 / symbols.len() as f64;
    symbols
        .iter()
        .map(|s| WeightPoint {
            date: on,
            symbol: s.to_string(),
            weight: w,
        })
        .collect()
}

pub fn event(line: u64, event_date: NaiveDate, symbol: &str) -> EventRow {
    EventRow {
        line,
        event_date,
        symbol: symbol.to_string(),
        signal_rank: 1.0,
        bucket: String::new(),
    }
}

pub fn source(name: &str, horizon: i64, tilt_size: f64) -> SourceConfig {
    SourceConfig {
        horizon,
        tilt_size,
        ..SourceConfig::new(name)
    }
}

/// Risk, regime and costs all switched off.
pub fn plain_config() -> RunConfig {
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

pub struct MockDataPort {
    pub prices: Vec<PricePoint>,
    pub base: Vec<WeightPoint>,
    pub vol_index: Vec<(NaiveDate, f64)>,
    pub adv: Option<Vec<AdvPoint>>,
    pub events: HashMap<String, Vec<EventRow>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            prices: Vec::new(),
            base: Vec::new(),
            vol_index: Vec::new(),
            adv: None,
            events: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, prices: Vec<PricePoint>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_base(mut self, base: Vec<WeightPoint>) -> Self {
        self.base = base;
        self
    }

    pub fn with_vol_index(mut self, points: Vec<(NaiveDate, f64)>) -> Self {
        self.vol_index = points;
        self
    }

    pub fn with_adv(mut self, adv: Vec<AdvPoint>) -> Self {
        self.adv = Some(adv);
        self
    }

    pub fn with_events(mut self, source: &str, rows: Vec<EventRow>) -> Self {
        self.events.insert(source.to_string(), rows);
        self
    }

    pub fn with_error(mut self, source: &str, reason: &str) -> Self {
        self.errors.insert(source.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_prices(&self) -> Result<Vec<PricePoint>, TiltbookError> {
        Ok(self.prices.clone())
    }

    fn load_base_weights(&self) -> Result<Vec<WeightPoint>, TiltbookError> {
        Ok(self.base.clone())
    }

    fn load_vol_index(&self) -> Result<Vec<(NaiveDate, f64)>, TiltbookError> {
        Ok(self.vol_index.clone())
    }

    fn load_adv(&self) -> Result<Option<Vec<AdvPoint>>, TiltbookError> {
        Ok(self.adv.clone())
    }

    fn load_events(&self, source: &str) -> Result<Vec<EventRow>, TiltbookError> {
        if let Some(reason) = self.errors.get(source) {
            return Err(TiltbookError::data(source, reason.clone()));
        }
        Ok(self.events.get(source).cloned().unwrap_or_default())
    }
}
