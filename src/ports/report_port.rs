//! Output port trait.

use std::path::Path;

use crate::domain::backtest::{DailyRecord, WeightRow};
use crate::domain::error::TiltbookError;
use crate::domain::sweep::SweepReport;

/// Port for writing run outputs.
pub trait ReportPort {
    fn write_weights(&self, rows: &[WeightRow], path: &Path) -> Result<(), TiltbookError>;

    fn write_daily(&self, records: &[DailyRecord], path: &Path) -> Result<(), TiltbookError>;

    fn write_sweep(&self, report: &SweepReport, path: &Path) -> Result<(), TiltbookError>;
}
