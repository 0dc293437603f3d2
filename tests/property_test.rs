//! Property tests for overlay and scaling invariants.
//!
//! Uses proptest to verify:
//! 1. Funding balances the net tilt on every date
//! 2. Composite weights sum to one before scaling
//! 3. Leverage always lands inside the configured band
//! 4. Regime scale never rises as the index rises
//! 5. An event tilts exactly the sessions of its window

mod common;

use chrono::NaiveDate;
use common::day;
use proptest::prelude::*;
use std::collections::BTreeMap;
use tiltbook::domain::config::{
    FundingRule, OverlayConfig, RegimeConfig, RiskConfig, SourceConfig,
};
use tiltbook::domain::event_book::EventBook;
use tiltbook::domain::market_data::VolIndexSeries;
use tiltbook::domain::overlay::{fund_tilts, OverlayCompositor, WEIGHT_SUM_TOLERANCE};
use tiltbook::domain::regime::RegimeGuard;
use tiltbook::domain::risk::RiskScaler;
use tiltbook::domain::timeline::Timeline;

fn arb_rule() -> impl Strategy<Value = FundingRule> {
    prop_oneof![Just(FundingRule::ProRata), Just(FundingRule::Equal)]
}

/// Base allocation over `S0..Sn` summing to one.
fn arb_base() -> impl Strategy<Value = BTreeMap<String, f64>> {
    prop::collection::vec(0.01..1.0_f64, 2..10).prop_map(|raw| {
        let total: f64 = raw.iter().sum();
        raw.iter()
            .enumerate()
            .map(|(i, w)| (format!("S{i}"), w / total))
            .collect()
    })
}

/// Base plus signed tilts on a strict subset of its symbols.
fn arb_base_and_tilts() -> impl Strategy<Value = (BTreeMap<String, f64>, BTreeMap<String, f64>)> {
    arb_base().prop_flat_map(|base| {
        let n = base.len();
        (
            Just(base),
            prop::collection::vec(prop::option::of(-0.05..0.05_f64), n - 1),
        )
            .prop_map(|(base, maybe)| {
                let tilts = base
                    .keys()
                    .zip(maybe)
                    .filter_map(|(symbol, t)| t.filter(|v| *v != 0.0).map(|v| (symbol.clone(), v)))
                    .collect();
                (base, tilts)
            })
    })
}

proptest! {
    /// Additions equal subtractions whenever a funder exists.
    #[test]
    fn funding_matches_net_tilt((base, tilts) in arb_base_and_tilts(), rule in arb_rule()) {
        let set = fund_tilts(&base, tilts, rule);
        prop_assert!((set.total_funding() - set.total_tilt()).abs() < 1e-12);
        let net: f64 = set.adjustments().values().sum();
        prop_assert!(net.abs() < 1e-12);
        for symbol in set.tilts.keys() {
            prop_assert!(!set.funding.contains_key(symbol));
        }
    }

    #[test]
    fn composite_weights_sum_to_one(
        (base, tilts) in arb_base_and_tilts(),
        rule in arb_rule(),
        cap in 0.0..0.1_f64,
    ) {
        let config = OverlayConfig {
            sources: vec![SourceConfig::new("pead")],
            tilt_cap: cap,
            funding: rule,
        };
        let compositor = OverlayCompositor::new(&config);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let composite = compositor.compose(date, &base, &[tilts]).unwrap();

        let sum: f64 = composite.weights.values().sum();
        prop_assert!((sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
        prop_assert!(composite.weights.values().all(|w| *w >= 0.0));
        for t in composite.tilts.tilts.values() {
            prop_assert!(t.abs() <= cap + 1e-15);
        }
    }

    #[test]
    fn leverage_within_band(
        history in prop::collection::vec(-0.05..0.05_f64, 0..120),
        drawdown in -0.5..0.0_f64,
        min in 0.1..1.0_f64,
        width in 0.0..3.0_f64,
        target in 0.01..0.3_f64,
        use_kelly in any::<bool>(),
    ) {
        let config = RiskConfig {
            target_vol: target,
            min_leverage: min,
            max_leverage: min + width,
            lookback: 30,
            use_kelly,
            ..RiskConfig::default()
        };
        let reading = RiskScaler::new(&config).leverage(&history, drawdown);
        prop_assert!(reading.leverage >= config.min_leverage);
        prop_assert!(reading.leverage <= config.max_leverage);
    }

    #[test]
    fn regime_scale_non_increasing(a in 0.0..80.0_f64, b in 0.0..80.0_f64) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let series = VolIndexSeries::default();
        let guard = RegimeGuard::new(&RegimeConfig::default(), &series);
        let (scale_low, state_low) = guard.level_scale(low);
        let (scale_high, state_high) = guard.level_scale(high);
        prop_assert!(scale_high <= scale_low);
        prop_assert!(state_high >= state_low);
    }

    #[test]
    fn event_tilts_exactly_its_window(open in 0usize..20, horizon in 1i64..15) {
        let timeline = Timeline::new((0..30).map(day));
        let mut book = EventBook::new(&timeline);
        book.add_event("AAA", day(open as u64), horizon, 0.01).unwrap();

        for session in 0..30usize {
            let date = day(session as u64);
            book.roll(date);
            let live = session >= open && session < open + horizon as usize;
            let tilt = book.active_tilts(date).get("AAA").copied();
            prop_assert_eq!(tilt.is_some(), live, "session {}", session);
        }
    }
}
