//! Frozen per-run configuration.
//!
//! A [`RunConfig`] is built once (from an INI file, a preset, or the sweep
//! grid), validated, and then handed by reference to every component
//! constructor. Nothing in the engine mutates it.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use super::config_validation::validate_run_config;
use super::error::TiltbookError;

/// How the net tilt on a date is taken out of the non-event symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FundingRule {
    /// Pro-rata to each non-event symbol's base weight.
    #[default]
    ProRata,
    /// Equal slice from every non-event symbol.
    Equal,
}

impl FromStr for FundingRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pro_rata" | "prorata" | "proportional" => Ok(FundingRule::ProRata),
            "equal" => Ok(FundingRule::Equal),
            other => Err(format!("unknown funding rule '{other}'")),
        }
    }
}

/// Series the spike detector z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpikeBasis {
    /// Day-over-day change of the index.
    #[default]
    Change,
    /// Raw index level.
    Level,
}

impl FromStr for SpikeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "change" | "diff" => Ok(SpikeBasis::Change),
            "level" => Ok(SpikeBasis::Level),
            other => Err(format!("unknown spike basis '{other}'")),
        }
    }
}

/// Named risk presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl Profile {
    /// (target_vol, min_leverage, max_leverage)
    pub fn risk_targets(&self) -> (f64, f64, f64) {
        match self {
            Profile::Conservative => (0.08, 0.5, 1.5),
            Profile::Moderate => (0.10, 0.5, 2.0),
            Profile::Aggressive => (0.12, 0.5, 2.5),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Profile::Conservative),
            "moderate" => Ok(Profile::Moderate),
            "aggressive" => Ok(Profile::Aggressive),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Conservative => "conservative",
            Profile::Moderate => "moderate",
            Profile::Aggressive => "aggressive",
        };
        f.write_str(name)
    }
}

/// One event-driven tilt source (e.g. earnings drift, buybacks).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub blend_weight: f64,
    pub tilt_size: f64,
    /// Lifetime of each event in trading sessions.
    pub horizon: i64,
    /// Events ranked below this floor are ignored.
    pub min_rank: f64,
    /// Calendar days between the event date and when it is usable.
    pub publication_lag_days: i64,
    /// Sessions between the usable date and the first tilted session.
    pub entry_delay: usize,
    /// Accepted buckets; empty accepts all.
    pub buckets: Vec<String>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blend_weight: 1.0,
            tilt_size: 0.015,
            horizon: 30,
            min_rank: 0.0,
            publication_lag_days: 0,
            entry_delay: 1,
            buckets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayConfig {
    pub sources: Vec<SourceConfig>,
    /// Symmetric cap on the blended tilt per symbol.
    pub tilt_cap: f64,
    pub funding: FundingRule,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            tilt_cap: 0.02,
            funding: FundingRule::ProRata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub enabled: bool,
    pub target_vol: f64,
    pub lookback: usize,
    pub min_leverage: f64,
    pub max_leverage: f64,
    pub drawdown_enabled: bool,
    /// Moderate tier, e.g. -0.10.
    pub dd_threshold_1: f64,
    /// Severe tier, e.g. -0.15.
    pub dd_threshold_2: f64,
    pub dd_reduction_1: f64,
    pub dd_reduction_2: f64,
    pub use_kelly: bool,
    pub kelly_fraction: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let (target_vol, min_leverage, max_leverage) = Profile::Moderate.risk_targets();
        Self {
            enabled: true,
            target_vol,
            lookback: 63,
            min_leverage,
            max_leverage,
            drawdown_enabled: true,
            dd_threshold_1: -0.10,
            dd_threshold_2: -0.15,
            dd_reduction_1: 0.75,
            dd_reduction_2: 0.50,
            use_kelly: false,
            kelly_fraction: 0.5,
        }
    }
}

/// Index level at or above `threshold` maps to exposure `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeTier {
    pub threshold: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    pub enabled: bool,
    /// Ascending thresholds.
    pub tiers: Vec<RegimeTier>,
    pub spike_enabled: bool,
    pub spike_zscore: f64,
    pub spike_reduction: f64,
    pub spike_lookback: usize,
    pub spike_basis: SpikeBasis,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiers: vec![
                RegimeTier {
                    threshold: 25.0,
                    scale: 0.75,
                },
                RegimeTier {
                    threshold: 30.0,
                    scale: 0.50,
                },
                RegimeTier {
                    threshold: 35.0,
                    scale: 0.25,
                },
            ],
            spike_enabled: true,
            spike_zscore: 2.0,
            spike_reduction: 0.5,
            spike_lookback: 63,
            spike_basis: SpikeBasis::Change,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostConfig {
    pub enabled: bool,
    pub base_bps: f64,
    pub adv_coeff: f64,
    pub vol_coeff: f64,
    pub min_cost_bps: f64,
    pub max_cost_bps: f64,
    /// Window for per-symbol realized volatility.
    pub vol_lookback: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_bps: 2.0,
            adv_coeff: 5.0,
            vol_coeff: 1.0,
            min_cost_bps: 1.0,
            max_cost_bps: 50.0,
            vol_lookback: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub overlay: OverlayConfig,
    pub risk: RiskConfig,
    pub regime: RegimeConfig,
    pub costs: CostConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            initial_capital: 1_000_000.0,
            risk_free_rate: 0.0,
            overlay: OverlayConfig::default(),
            risk: RiskConfig::default(),
            regime: RegimeConfig::default(),
            costs: CostConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: RunConfig::default(),
        }
    }

    /// Builder seeded from a named preset.
    pub fn preset(profile: Profile) -> RunConfigBuilder {
        Self::builder().profile(profile)
    }

    pub fn validate(&self) -> Result<(), TiltbookError> {
        validate_run_config(self)
    }
}

/// Assembles a [`RunConfig`]; `build` validates before handing it out.
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Applies the preset's volatility target and leverage band.
    pub fn profile(mut self, profile: Profile) -> Self {
        let (target_vol, min_leverage, max_leverage) = profile.risk_targets();
        self.config.risk.target_vol = target_vol;
        self.config.risk.min_leverage = min_leverage;
        self.config.risk.max_leverage = max_leverage;
        self
    }

    pub fn dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.config.start_date = start;
        self.config.end_date = end;
        self
    }

    pub fn initial_capital(mut self, capital: f64) -> Self {
        self.config.initial_capital = capital;
        self
    }

    pub fn risk_free_rate(mut self, rate: f64) -> Self {
        self.config.risk_free_rate = rate;
        self
    }

    pub fn target_vol(mut self, target_vol: f64) -> Self {
        self.config.risk.target_vol = target_vol;
        self
    }

    pub fn leverage_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.risk.min_leverage = min;
        self.config.risk.max_leverage = max;
        self
    }

    pub fn tilt_cap(mut self, cap: f64) -> Self {
        self.config.overlay.tilt_cap = cap;
        self
    }

    pub fn funding(mut self, rule: FundingRule) -> Self {
        self.config.overlay.funding = rule;
        self
    }

    pub fn source(mut self, source: SourceConfig) -> Self {
        self.config.overlay.sources.push(source);
        self
    }

    pub fn risk(mut self, risk: RiskConfig) -> Self {
        self.config.risk = risk;
        self
    }

    pub fn regime(mut self, regime: RegimeConfig) -> Self {
        self.config.regime = regime;
        self
    }

    pub fn costs(mut self, costs: CostConfig) -> Self {
        self.config.costs = costs;
        self
    }

    pub fn build(self) -> Result<RunConfig, TiltbookError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn presets_set_risk_targets() {
        let c = RunConfig::preset(Profile::Conservative).build().unwrap();
        assert_eq!(c.risk.target_vol, 0.08);
        assert_eq!(c.risk.max_leverage, 1.5);

        let a = RunConfig::preset(Profile::Aggressive).build().unwrap();
        assert_eq!(a.risk.target_vol, 0.12);
        assert_eq!(a.risk.max_leverage, 2.5);
    }

    #[test]
    fn builder_overrides_after_preset() {
        let c = RunConfig::preset(Profile::Aggressive)
            .target_vol(0.15)
            .build()
            .unwrap();
        assert_eq!(c.risk.target_vol, 0.15);
        assert_eq!(c.risk.max_leverage, 2.5);
    }

    #[test]
    fn builder_rejects_inverted_leverage() {
        let err = RunConfig::builder()
            .leverage_bounds(2.0, 1.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, TiltbookError::ConfigInvalid { ref key, .. } if key == "min_leverage"));
    }

    #[test]
    fn profile_parse_and_display() {
        assert_eq!("Aggressive".parse::<Profile>().unwrap(), Profile::Aggressive);
        assert_eq!(Profile::Conservative.to_string(), "conservative");
        assert!("reckless".parse::<Profile>().is_err());
    }

    #[test]
    fn funding_rule_parse() {
        assert_eq!("pro_rata".parse::<FundingRule>().unwrap(), FundingRule::ProRata);
        assert_eq!("EQUAL".parse::<FundingRule>().unwrap(), FundingRule::Equal);
        assert!("random".parse::<FundingRule>().is_err());
    }

    #[test]
    fn spike_basis_parse() {
        assert_eq!("level".parse::<SpikeBasis>().unwrap(), SpikeBasis::Level);
        assert_eq!("change".parse::<SpikeBasis>().unwrap(), SpikeBasis::Change);
    }
}
