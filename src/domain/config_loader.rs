//! Typed configuration from a [`ConfigPort`].
//!
//! Missing keys fall back to the defaults (or the `[backtest] profile`
//! preset); present keys that fail to parse are errors naming the key.

use chrono::NaiveDate;
use std::str::FromStr;

use crate::domain::config::{
    CostConfig, FundingRule, Profile, RegimeConfig, RegimeTier, RiskConfig, RunConfig,
    SourceConfig, SpikeBasis,
};
use crate::domain::error::TiltbookError;
use crate::domain::metrics::EvalSplit;
use crate::domain::sweep::ParamGrid;
use crate::ports::config_port::ConfigPort;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TiltbookError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<f64>().map_err(|_| {
            TiltbookError::invalid(section, key, format!("expected a number, got '{raw}'"))
        }),
    }
}

fn integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TiltbookError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            TiltbookError::invalid(section, key, format!("expected an integer, got '{raw}'"))
        }),
    }
}

fn count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TiltbookError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            TiltbookError::invalid(
                section,
                key,
                format!("expected a non-negative integer, got '{raw}'"),
            )
        }),
    }
}

fn boolean(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, TiltbookError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(TiltbookError::invalid(
                section,
                key,
                format!("expected true/false, got '{raw}'"),
            )),
        },
    }
}

fn parsed<T: FromStr<Err = String>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, TiltbookError> {
    config
        .get_string(section, key)
        .map(|raw| raw.parse::<T>().map_err(|e| TiltbookError::invalid(section, key, e)))
        .transpose()
}

fn date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, TiltbookError> {
    config
        .get_string(section, key)
        .map(|raw| parse_date(section, key, &raw))
        .transpose()
}

fn parse_date(section: &str, key: &str, raw: &str) -> Result<NaiveDate, TiltbookError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        TiltbookError::invalid(section, key, "invalid date format (expected YYYY-MM-DD)")
    })
}

fn numbers(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Vec<f64>, TiltbookError> {
    config
        .get_list(section, key)
        .iter()
        .map(|item| {
            item.parse::<f64>().map_err(|_| {
                TiltbookError::invalid(section, key, format!("expected a number, got '{item}'"))
            })
        })
        .collect()
}

/// Builds and validates the run configuration.
pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfig, TiltbookError> {
    let profile: Option<Profile> = parsed(config, "backtest", "profile")?;

    let mut builder = RunConfig::builder()
        .dates(
            date(config, "backtest", "start_date")?,
            date(config, "backtest", "end_date")?,
        )
        .initial_capital(double(config, "backtest", "initial_capital", 1_000_000.0)?)
        .risk_free_rate(double(config, "backtest", "risk_free_rate", 0.0)?)
        .tilt_cap(double(config, "overlay", "tilt_cap", 0.02)?)
        .funding(parsed(config, "overlay", "funding")?.unwrap_or_default())
        .risk(build_risk(config, profile.unwrap_or_default())?)
        .regime(build_regime(config)?)
        .costs(build_costs(config)?);

    for name in config.get_list("overlay", "sources") {
        builder = builder.source(build_source(config, &name)?);
    }
    builder.build()
}

fn build_source(config: &dyn ConfigPort, name: &str) -> Result<SourceConfig, TiltbookError> {
    let section = format!("source.{name}");
    let defaults = SourceConfig::new(name);
    Ok(SourceConfig {
        blend_weight: double(config, &section, "blend_weight", defaults.blend_weight)?,
        tilt_size: double(config, &section, "tilt_size", defaults.tilt_size)?,
        horizon: integer(config, &section, "horizon", defaults.horizon)?,
        min_rank: double(config, &section, "min_rank", defaults.min_rank)?,
        publication_lag_days: integer(
            config,
            &section,
            "publication_lag_days",
            defaults.publication_lag_days,
        )?,
        entry_delay: count(config, &section, "entry_delay", defaults.entry_delay)?,
        buckets: config.get_list(&section, "buckets"),
        ..defaults
    })
}

fn build_risk(config: &dyn ConfigPort, profile: Profile) -> Result<RiskConfig, TiltbookError> {
    let (target_vol, min_leverage, max_leverage) = profile.risk_targets();
    let d = RiskConfig {
        target_vol,
        min_leverage,
        max_leverage,
        ..RiskConfig::default()
    };
    Ok(RiskConfig {
        enabled: boolean(config, "risk", "enabled", d.enabled)?,
        target_vol: double(config, "risk", "target_vol", d.target_vol)?,
        lookback: count(config, "risk", "lookback", d.lookback)?,
        min_leverage: double(config, "risk", "min_leverage", d.min_leverage)?,
        max_leverage: double(config, "risk", "max_leverage", d.max_leverage)?,
        drawdown_enabled: boolean(config, "risk", "drawdown_enabled", d.drawdown_enabled)?,
        dd_threshold_1: double(config, "risk", "dd_threshold_1", d.dd_threshold_1)?,
        dd_threshold_2: double(config, "risk", "dd_threshold_2", d.dd_threshold_2)?,
        dd_reduction_1: double(config, "risk", "dd_reduction_1", d.dd_reduction_1)?,
        dd_reduction_2: double(config, "risk", "dd_reduction_2", d.dd_reduction_2)?,
        use_kelly: boolean(config, "risk", "use_kelly", d.use_kelly)?,
        kelly_fraction: double(config, "risk", "kelly_fraction", d.kelly_fraction)?,
    })
}

fn build_regime(config: &dyn ConfigPort) -> Result<RegimeConfig, TiltbookError> {
    let d = RegimeConfig::default();

    let thresholds = numbers(config, "regime", "thresholds")?;
    let scales = numbers(config, "regime", "scales")?;
    let tiers = match (thresholds.is_empty(), scales.is_empty()) {
        (true, true) => d.tiers.clone(),
        _ if thresholds.len() != scales.len() => {
            return Err(TiltbookError::invalid(
                "regime",
                "scales",
                format!(
                    "{} thresholds but {} scales",
                    thresholds.len(),
                    scales.len()
                ),
            ));
        }
        _ => thresholds
            .into_iter()
            .zip(scales)
            .map(|(threshold, scale)| RegimeTier { threshold, scale })
            .collect(),
    };

    Ok(RegimeConfig {
        enabled: boolean(config, "regime", "enabled", d.enabled)?,
        tiers,
        spike_enabled: boolean(config, "regime", "spike_enabled", d.spike_enabled)?,
        spike_zscore: double(config, "regime", "spike_zscore", d.spike_zscore)?,
        spike_reduction: double(config, "regime", "spike_reduction", d.spike_reduction)?,
        spike_lookback: count(config, "regime", "spike_lookback", d.spike_lookback)?,
        spike_basis: parsed::<SpikeBasis>(config, "regime", "spike_basis")?
            .unwrap_or(d.spike_basis),
    })
}

fn build_costs(config: &dyn ConfigPort) -> Result<CostConfig, TiltbookError> {
    let d = CostConfig::default();
    Ok(CostConfig {
        enabled: boolean(config, "costs", "enabled", d.enabled)?,
        base_bps: double(config, "costs", "base_bps", d.base_bps)?,
        adv_coeff: double(config, "costs", "adv_coeff", d.adv_coeff)?,
        vol_coeff: double(config, "costs", "vol_coeff", d.vol_coeff)?,
        min_cost_bps: double(config, "costs", "min_cost_bps", d.min_cost_bps)?,
        max_cost_bps: double(config, "costs", "max_cost_bps", d.max_cost_bps)?,
        vol_lookback: count(config, "costs", "vol_lookback", d.vol_lookback)?,
    })
}

/// `[splits]` entries of the form `name = YYYY-MM-DD/YYYY-MM-DD`.
pub fn build_splits(config: &dyn ConfigPort) -> Result<Vec<EvalSplit>, TiltbookError> {
    let mut splits = Vec::new();
    for name in config.keys("splits") {
        let Some(raw) = config.get_string("splits", &name) else {
            continue;
        };
        let Some((start, end)) = raw.split_once('/') else {
            return Err(TiltbookError::invalid(
                "splits",
                &name,
                "expected START/END dates",
            ));
        };
        let start = parse_date("splits", &name, start)?;
        let end = parse_date("splits", &name, end)?;
        if start > end {
            return Err(TiltbookError::invalid(
                "splits",
                &name,
                "start must not be after end",
            ));
        }
        splits.push(EvalSplit { name, start, end });
    }
    splits.sort_by_key(|s| s.start);
    Ok(splits)
}

/// Splits `a | b | c` into alternatives and parses each one.
fn alternatives<T>(
    key: &str,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, TiltbookError> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|alt| {
            parse(alt).ok_or_else(|| {
                TiltbookError::invalid("sweep", key, format!("cannot parse alternative '{alt}'"))
            })
        })
        .collect()
}

fn tuple(alt: &str) -> Option<Vec<f64>> {
    alt.split('/')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

fn pair(alt: &str) -> Option<(f64, f64)> {
    match tuple(alt)?.as_slice() {
        [a, b] => Some((*a, *b)),
        _ => None,
    }
}

fn check_width(key: &str, values: &[Vec<f64>], width: usize) -> Result<(), TiltbookError> {
    match values.iter().find(|v| v.len() != width) {
        Some(bad) => Err(TiltbookError::invalid(
            "sweep",
            key,
            format!("expected {width} values per alternative, got {}", bad.len()),
        )),
        None => Ok(()),
    }
}

/// `[sweep]` alternatives over `base`. Tuple-valued parameters separate
/// their members with `/`.
pub fn build_param_grid(
    config: &dyn ConfigPort,
    base: &RunConfig,
) -> Result<ParamGrid, TiltbookError> {
    let mut grid = ParamGrid::default();
    for key in config.keys("sweep") {
        let Some(raw) = config.get_string("sweep", &key) else {
            continue;
        };
        let number = |s: &str| s.parse::<f64>().ok();
        match key.as_str() {
            "target_vol" => grid.target_vol = alternatives(&key, &raw, number)?,
            "leverage" => grid.leverage_bounds = alternatives(&key, &raw, pair)?,
            "dd_thresholds" => grid.dd_thresholds = alternatives(&key, &raw, pair)?,
            "dd_reductions" => grid.dd_reductions = alternatives(&key, &raw, pair)?,
            "regime_scales" => {
                let values = alternatives(&key, &raw, tuple)?;
                check_width(&key, &values, base.regime.tiers.len())?;
                grid.regime_scales = values;
            }
            "spike_zscore" => grid.spike_zscore = alternatives(&key, &raw, number)?,
            "tilt_cap" => grid.tilt_cap = alternatives(&key, &raw, number)?,
            "blend_weights" => {
                let values = alternatives(&key, &raw, tuple)?;
                check_width(&key, &values, base.overlay.sources.len())?;
                grid.blend_weights = values;
            }
            "horizon" => grid.horizon = alternatives(&key, &raw, |s| s.parse::<i64>().ok())?,
            "tilt_size" => grid.tilt_size = alternatives(&key, &raw, number)?,
            "funding" => grid.funding = alternatives(&key, &raw, |s| s.parse::<FundingRule>().ok())?,
            "base_bps" => grid.base_bps = alternatives(&key, &raw, number)?,
            other => {
                return Err(TiltbookError::invalid(
                    "sweep",
                    other,
                    "not a sweepable parameter",
                ));
            }
        }
    }
    Ok(grid)
}
