//! Configuration validation.
//!
//! Every invariant is checked once at startup; a violation is fatal for the
//! run and never surfaces as a per-date error.

use crate::domain::config::{CostConfig, OverlayConfig, RegimeConfig, RiskConfig, RunConfig};
use crate::domain::error::TiltbookError;

pub fn validate_run_config(config: &RunConfig) -> Result<(), TiltbookError> {
    validate_backtest(config)?;
    validate_overlay(&config.overlay)?;
    validate_risk(&config.risk)?;
    validate_regime(&config.regime)?;
    validate_costs(&config.costs)?;
    Ok(())
}

fn validate_backtest(config: &RunConfig) -> Result<(), TiltbookError> {
    if !(config.initial_capital > 0.0 && config.initial_capital.is_finite()) {
        return Err(TiltbookError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if !(0.0..1.0).contains(&config.risk_free_rate) {
        return Err(TiltbookError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    if let (Some(start), Some(end)) = (config.start_date, config.end_date) {
        if start >= end {
            return Err(TiltbookError::invalid(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

fn validate_overlay(overlay: &OverlayConfig) -> Result<(), TiltbookError> {
    if !(overlay.tilt_cap >= 0.0 && overlay.tilt_cap.is_finite()) {
        return Err(TiltbookError::invalid(
            "overlay",
            "tilt_cap",
            "tilt_cap must be non-negative",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for source in &overlay.sources {
        let section = format!("source.{}", source.name);
        if !seen.insert(source.name.as_str()) {
            return Err(TiltbookError::invalid(
                "overlay",
                "sources",
                format!("duplicate source '{}'", source.name),
            ));
        }
        if !source.blend_weight.is_finite() {
            return Err(TiltbookError::invalid(
                &section,
                "blend_weight",
                "blend_weight must be finite",
            ));
        }
        if source.tilt_size == 0.0 || !source.tilt_size.is_finite() {
            return Err(TiltbookError::invalid(
                &section,
                "tilt_size",
                "tilt_size must be non-zero",
            ));
        }
        if source.horizon < 1 {
            return Err(TiltbookError::invalid(
                &section,
                "horizon",
                "horizon must be at least 1 session",
            ));
        }
        if source.publication_lag_days < 0 {
            return Err(TiltbookError::invalid(
                &section,
                "publication_lag_days",
                "publication_lag_days must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_risk(risk: &RiskConfig) -> Result<(), TiltbookError> {
    if !(risk.target_vol > 0.0 && risk.target_vol.is_finite()) {
        return Err(TiltbookError::invalid(
            "risk",
            "target_vol",
            "target_vol must be positive",
        ));
    }
    if risk.lookback < 2 {
        return Err(TiltbookError::invalid(
            "risk",
            "lookback",
            "lookback must be at least 2 sessions",
        ));
    }
    if !(risk.min_leverage > 0.0) {
        return Err(TiltbookError::invalid(
            "risk",
            "min_leverage",
            "min_leverage must be positive",
        ));
    }
    if risk.min_leverage > risk.max_leverage || !risk.max_leverage.is_finite() {
        return Err(TiltbookError::invalid(
            "risk",
            "min_leverage",
            "min_leverage must not exceed max_leverage",
        ));
    }
    if risk.dd_threshold_1 >= 0.0 || risk.dd_threshold_2 >= 0.0 {
        return Err(TiltbookError::invalid(
            "risk",
            "dd_threshold_1",
            "drawdown thresholds must be negative",
        ));
    }
    if risk.dd_threshold_2 > risk.dd_threshold_1 {
        return Err(TiltbookError::invalid(
            "risk",
            "dd_threshold_2",
            "dd_threshold_2 must be at or below dd_threshold_1",
        ));
    }
    for (key, value) in [
        ("dd_reduction_1", risk.dd_reduction_1),
        ("dd_reduction_2", risk.dd_reduction_2),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(TiltbookError::invalid(
                "risk",
                key,
                format!("{key} must be in (0, 1]"),
            ));
        }
    }
    if !(risk.kelly_fraction > 0.0 && risk.kelly_fraction <= 1.0) {
        return Err(TiltbookError::invalid(
            "risk",
            "kelly_fraction",
            "kelly_fraction must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_regime(regime: &RegimeConfig) -> Result<(), TiltbookError> {
    for pair in regime.tiers.windows(2) {
        if pair[1].threshold <= pair[0].threshold {
            return Err(TiltbookError::invalid(
                "regime",
                "thresholds",
                "thresholds must be strictly ascending",
            ));
        }
        if pair[1].scale > pair[0].scale {
            return Err(TiltbookError::invalid(
                "regime",
                "scales",
                "scales must not increase with the threshold",
            ));
        }
    }
    for tier in &regime.tiers {
        if !(0.0..=1.0).contains(&tier.scale) || !tier.threshold.is_finite() {
            return Err(TiltbookError::invalid(
                "regime",
                "scales",
                "each scale must be in [0, 1]",
            ));
        }
    }
    if !(regime.spike_reduction >= 0.0 && regime.spike_reduction <= 1.0) {
        return Err(TiltbookError::invalid(
            "regime",
            "spike_reduction",
            "spike_reduction must be in [0, 1]",
        ));
    }
    if !regime.spike_zscore.is_finite() {
        return Err(TiltbookError::invalid(
            "regime",
            "spike_zscore",
            "spike_zscore must be finite",
        ));
    }
    if regime.spike_lookback < 2 {
        return Err(TiltbookError::invalid(
            "regime",
            "spike_lookback",
            "spike_lookback must be at least 2",
        ));
    }
    Ok(())
}

fn validate_costs(costs: &CostConfig) -> Result<(), TiltbookError> {
    for (key, value) in [
        ("base_bps", costs.base_bps),
        ("adv_coeff", costs.adv_coeff),
        ("vol_coeff", costs.vol_coeff),
        ("min_cost_bps", costs.min_cost_bps),
    ] {
        if !(value >= 0.0 && value.is_finite()) {
            return Err(TiltbookError::invalid(
                "costs",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    if !(costs.max_cost_bps >= costs.min_cost_bps) {
        return Err(TiltbookError::invalid(
            "costs",
            "max_cost_bps",
            "max_cost_bps must be at least min_cost_bps",
        ));
    }
    if costs.vol_lookback < 2 {
        return Err(TiltbookError::invalid(
            "costs",
            "vol_lookback",
            "vol_lookback must be at least 2",
        ));
    }
    Ok(())
}
