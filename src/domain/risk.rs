//! Volatility-targeting leverage with drawdown de-risking.

use super::config::RiskConfig;
use super::stats::{annualized_vol, mean, sample_variance};

/// Running NAV peak. The peak only ever rises.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownTracker {
    peak: f64,
    last: f64,
}

impl DrawdownTracker {
    pub fn new(initial_nav: f64) -> Self {
        Self {
            peak: initial_nav,
            last: initial_nav,
        }
    }

    /// Records a new NAV and returns the drawdown it implies.
    pub fn update(&mut self, nav: f64) -> f64 {
        if nav > self.peak {
            self.peak = nav;
        }
        self.last = nav;
        self.drawdown()
    }

    /// `nav / peak - 1` for the last recorded NAV; zero or negative.
    pub fn drawdown(&self) -> f64 {
        if self.peak > 0.0 {
            (self.last / self.peak - 1.0).min(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeverageReading {
    pub leverage: f64,
    pub realized_vol: Option<f64>,
    pub kelly: Option<f64>,
    pub drawdown: f64,
    pub drawdown_multiplier: f64,
}

impl LeverageReading {
    pub fn neutral(drawdown: f64) -> Self {
        Self {
            leverage: 1.0,
            realized_vol: None,
            kelly: None,
            drawdown,
            drawdown_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskScaler {
    config: RiskConfig,
}

impl RiskScaler {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Observations needed before realized volatility is defined.
    pub fn min_observations(&self) -> usize {
        (self.config.lookback / 2).max(2)
    }

    /// Leverage for a date given the composite returns through the prior
    /// session (oldest first) and the current drawdown.
    pub fn leverage(&self, history: &[f64], drawdown: f64) -> LeverageReading {
        if !self.config.enabled {
            return LeverageReading::neutral(drawdown);
        }

        let window = &history[history.len().saturating_sub(self.config.lookback)..];
        let defined = window.len() >= self.min_observations();
        let realized_vol = if defined { annualized_vol(window) } else { None };

        let mut leverage = self.vol_target_leverage(realized_vol);
        let kelly = if self.config.use_kelly && defined {
            self.kelly_leverage(window)
        } else {
            None
        };
        if let Some(k) = kelly {
            leverage = leverage.min(k);
        }

        let drawdown_multiplier = self.drawdown_multiplier(drawdown);
        leverage = (leverage * drawdown_multiplier)
            .clamp(self.config.min_leverage, self.config.max_leverage);

        LeverageReading {
            leverage,
            realized_vol,
            kelly,
            drawdown,
            drawdown_multiplier,
        }
    }

    /// `target / realized`, clipped to the leverage band; 1.0 when the
    /// volatility is missing, zero or not finite.
    pub fn vol_target_leverage(&self, realized_vol: Option<f64>) -> f64 {
        match realized_vol {
            Some(vol) if vol > 0.0 && vol.is_finite() => (self.config.target_vol / vol)
                .clamp(self.config.min_leverage, self.config.max_leverage),
            _ => 1.0,
        }
    }

    /// Single most severe tier.
    pub fn drawdown_multiplier(&self, drawdown: f64) -> f64 {
        if !self.config.drawdown_enabled {
            return 1.0;
        }
        if drawdown <= self.config.dd_threshold_2 {
            self.config.dd_reduction_2
        } else if drawdown <= self.config.dd_threshold_1 {
            self.config.dd_reduction_1
        } else {
            1.0
        }
    }

    fn kelly_leverage(&self, window: &[f64]) -> Option<f64> {
        let m = mean(window)?;
        let var = sample_variance(window)?;
        if var <= 0.0 {
            return None;
        }
        let k = m / var * self.config.kelly_fraction;
        k.is_finite().then_some(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scaler() -> RiskScaler {
        RiskScaler::new(&RiskConfig::default())
    }

    #[test]
    fn high_vol_clips_to_min_leverage() {
        assert_relative_eq!(scaler().vol_target_leverage(Some(0.20)), 0.5);
    }

    #[test]
    fn low_vol_clips_to_max_leverage() {
        assert_relative_eq!(scaler().vol_target_leverage(Some(0.01)), 2.0);
    }

    #[test]
    fn undefined_vol_is_neutral() {
        assert_eq!(scaler().vol_target_leverage(None), 1.0);
        assert_eq!(scaler().vol_target_leverage(Some(0.0)), 1.0);
        assert_eq!(scaler().vol_target_leverage(Some(f64::NAN)), 1.0);
    }

    #[test]
    fn short_history_is_neutral() {
        let reading = scaler().leverage(&[0.01; 10], 0.0);
        assert_eq!(reading.realized_vol, None);
        assert_eq!(reading.leverage, 1.0);
    }

    #[test]
    fn drawdown_tiers_pick_most_severe() {
        let s = scaler();
        assert_eq!(s.drawdown_multiplier(-0.05), 1.0);
        assert_eq!(s.drawdown_multiplier(-0.10), 0.75);
        assert_eq!(s.drawdown_multiplier(-0.12), 0.75);
        assert_eq!(s.drawdown_multiplier(-0.20), 0.50);
    }

    #[test]
    fn final_leverage_stays_in_band_under_drawdown() {
        let history: Vec<f64> = (0..63)
            .map(|i| if i % 2 == 0 { 0.03 } else { -0.03 })
            .collect();
        let reading = scaler().leverage(&history, -0.30);
        assert_eq!(reading.drawdown_multiplier, 0.5);
        assert_relative_eq!(reading.leverage, 0.5);
    }

    #[test]
    fn only_lookback_window_is_used() {
        let mut history = vec![0.05, -0.05, 0.05, -0.05];
        history.extend((0..63).map(|i| if i % 2 == 0 { 0.001 } else { -0.001 }));
        let reading = scaler().leverage(&history, 0.0);
        assert_relative_eq!(reading.leverage, 2.0);
    }

    #[test]
    fn kelly_caps_leverage() {
        let mut config = RiskConfig::default();
        config.use_kelly = true;
        let s = RiskScaler::new(&config);
        // Tiny vol but negative drift: Kelly is negative and the band floor wins.
        let history: Vec<f64> = (0..63)
            .map(|i| if i % 2 == 0 { 0.0005 } else { -0.0015 })
            .collect();
        let reading = s.leverage(&history, 0.0);
        assert!(reading.kelly.unwrap() < 0.0);
        assert_relative_eq!(reading.leverage, 0.5);
    }

    #[test]
    fn disabled_scaler_is_neutral() {
        let mut config = RiskConfig::default();
        config.enabled = false;
        let reading = RiskScaler::new(&config).leverage(&[0.1, -0.1, 0.1], -0.5);
        assert_eq!(reading.leverage, 1.0);
    }

    #[test]
    fn drawdown_tracker_peak_only_rises() {
        let mut dd = DrawdownTracker::new(100.0);
        assert_eq!(dd.update(110.0), 0.0);
        assert_relative_eq!(dd.update(99.0), -0.1, epsilon = 1e-12);
        // A partial recovery is still measured from the old peak.
        assert_relative_eq!(dd.update(105.0), 105.0 / 110.0 - 1.0, epsilon = 1e-12);
    }
}
