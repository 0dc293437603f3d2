//! Data access port trait.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::error::TiltbookError;
use crate::domain::event::EventRow;
use crate::domain::market_data::{
    AdvPoint, AdvTable, BaseWeights, MarketData, PricePoint, PriceTable, VolIndexSeries,
    WeightPoint,
};

pub trait DataPort {
    fn load_prices(&self) -> Result<Vec<PricePoint>, TiltbookError>;

    fn load_base_weights(&self) -> Result<Vec<WeightPoint>, TiltbookError>;

    fn load_vol_index(&self) -> Result<Vec<(NaiveDate, f64)>, TiltbookError>;

    /// `None` when no ADV source is configured.
    fn load_adv(&self) -> Result<Option<Vec<AdvPoint>>, TiltbookError>;

    fn load_events(&self, source: &str) -> Result<Vec<EventRow>, TiltbookError>;

    /// Loads everything a run over `sources` needs.
    fn load_market_data(&self, sources: &[String]) -> Result<MarketData, TiltbookError> {
        let mut events = HashMap::new();
        for source in sources {
            events.insert(source.clone(), self.load_events(source)?);
        }
        Ok(MarketData {
            prices: PriceTable::from_points(self.load_prices()?),
            base: BaseWeights::from_points(self.load_base_weights()?),
            vol_index: VolIndexSeries::new(self.load_vol_index()?),
            adv: self.load_adv()?.map(AdvTable::from_points),
            events,
        })
    }
}
