//! CSV file adapters for run inputs and outputs.
//!
//! Every input file needs a header row; columns are matched by name so
//! their order does not matter.

use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::domain::backtest::{DailyRecord, WeightRow};
use crate::domain::error::{EventError, TiltbookError};
use crate::domain::event::EventRow;
use crate::domain::market_data::{AdvPoint, PricePoint, WeightPoint};
use crate::domain::sweep::{SweepOutcome, SweepReport};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Where each input lives.
#[derive(Debug, Clone, Default)]
pub struct DataPaths {
    pub prices: PathBuf,
    pub base_weights: PathBuf,
    pub vol_index: Option<PathBuf>,
    pub adv: Option<PathBuf>,
    /// Event table per source name.
    pub events: HashMap<String, PathBuf>,
}

pub struct CsvAdapter {
    paths: DataPaths,
}

impl CsvAdapter {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }
}

/// Header-indexed reader over one file.
struct Table {
    name: String,
    reader: csv::Reader<File>,
    headers: StringRecord,
}

impl Table {
    fn open(path: &Path) -> Result<Self, TiltbookError> {
        let name = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| TiltbookError::data(&name, format!("failed to open: {e}")))?;
        let headers = reader
            .headers()
            .map_err(|e| TiltbookError::data(&name, format!("failed to read header: {e}")))?
            .clone();
        Ok(Self {
            name,
            reader,
            headers,
        })
    }

    fn column(&self, column: &str) -> Result<usize, TiltbookError> {
        self.optional_column(column).ok_or_else(|| {
            TiltbookError::data(&self.name, format!("missing column '{column}'"))
        })
    }

    fn optional_column(&self, column: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))
    }

    /// Yields (line, record) pairs.
    fn rows(&mut self) -> impl Iterator<Item = Result<(u64, StringRecord), TiltbookError>> + '_ {
        let name = self.name.clone();
        self.reader.records().map(move |result| {
            let record = result.map_err(|e| TiltbookError::data(&name, format!("CSV parse error: {e}")))?;
            let line = record.position().map_or(0, |p| p.line());
            Ok((line, record))
        })
    }
}

fn field<'r>(
    table_name: &str,
    record: &'r StringRecord,
    line: u64,
    idx: usize,
    column: &str,
) -> Result<&'r str, TiltbookError> {
    record.get(idx).ok_or_else(|| {
        TiltbookError::data(table_name, format!("line {line}: missing {column} value"))
    })
}

fn parse_date(table_name: &str, value: &str, line: u64) -> Result<NaiveDate, TiltbookError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        TiltbookError::data(
            table_name,
            format!("line {line}: invalid date '{value}' (expected YYYY-MM-DD)"),
        )
    })
}

fn parse_f64(table_name: &str, value: &str, line: u64, column: &str) -> Result<f64, TiltbookError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            TiltbookError::data(table_name, format!("line {line}: invalid {column} '{value}'"))
        })
}

fn parse_symbol(table_name: &str, value: &str, line: u64) -> Result<String, TiltbookError> {
    if value.is_empty() {
        return Err(TiltbookError::data(
            table_name,
            format!("line {line}: empty symbol"),
        ));
    }
    Ok(value.to_uppercase())
}

/// Reads `date,symbol,<value>` rows.
fn read_symbol_series(
    path: &Path,
    value_column: &str,
) -> Result<Vec<(NaiveDate, String, f64)>, TiltbookError> {
    let mut table = Table::open(path)?;
    let date_idx = table.column("date")?;
    let symbol_idx = table.column("symbol")?;
    let value_idx = table.column(value_column)?;
    let name = table.name.clone();

    let mut out = Vec::new();
    for row in table.rows() {
        let (line, record) = row?;
        let date = parse_date(&name, field(&name, &record, line, date_idx, "date")?, line)?;
        let symbol = parse_symbol(&name, field(&name, &record, line, symbol_idx, "symbol")?, line)?;
        let value = parse_f64(
            &name,
            field(&name, &record, line, value_idx, value_column)?,
            line,
            value_column,
        )?;
        out.push((date, symbol, value));
    }
    Ok(out)
}

impl DataPort for CsvAdapter {
    fn load_prices(&self) -> Result<Vec<PricePoint>, TiltbookError> {
        let rows = read_symbol_series(&self.paths.prices, "close")?;
        tracing::info!(path = %self.paths.prices.display(), rows = rows.len(), "prices loaded");
        Ok(rows
            .into_iter()
            .map(|(date, symbol, close)| PricePoint {
                date,
                symbol,
                close,
            })
            .collect())
    }

    fn load_base_weights(&self) -> Result<Vec<WeightPoint>, TiltbookError> {
        let rows = read_symbol_series(&self.paths.base_weights, "weight")?;
        Ok(rows
            .into_iter()
            .map(|(date, symbol, weight)| WeightPoint {
                date,
                symbol,
                weight,
            })
            .collect())
    }

    fn load_vol_index(&self) -> Result<Vec<(NaiveDate, f64)>, TiltbookError> {
        let Some(path) = &self.paths.vol_index else {
            return Ok(Vec::new());
        };
        let mut table = Table::open(path)?;
        let date_idx = table.column("date")?;
        let close_idx = table.column("close")?;
        let name = table.name.clone();

        let mut out = Vec::new();
        for row in table.rows() {
            let (line, record) = row?;
            let date = parse_date(&name, field(&name, &record, line, date_idx, "date")?, line)?;
            let close = parse_f64(
                &name,
                field(&name, &record, line, close_idx, "close")?,
                line,
                "close",
            )?;
            out.push((date, close));
        }
        Ok(out)
    }

    fn load_adv(&self) -> Result<Option<Vec<AdvPoint>>, TiltbookError> {
        let Some(path) = &self.paths.adv else {
            return Ok(None);
        };
        let rows = read_symbol_series(path, "adv")?;
        Ok(Some(
            rows.into_iter()
                .map(|(date, symbol, adv)| AdvPoint { date, symbol, adv })
                .collect(),
        ))
    }

    fn load_events(&self, source: &str) -> Result<Vec<EventRow>, TiltbookError> {
        let path = self.paths.events.get(source).ok_or_else(|| {
            TiltbookError::missing(&format!("source.{source}"), "events")
        })?;
        let mut table = Table::open(path)?;
        let date_idx = table.column("event_date")?;
        let symbol_idx = table.column("symbol")?;
        let rank_idx = table.optional_column("signal_rank");
        let bucket_idx = table.optional_column("bucket");
        let name = table.name.clone();

        let mut out = Vec::new();
        for row in table.rows() {
            let (line, record) = row?;
            let invalid = |reason: EventError| TiltbookError::InvalidEvent {
                source_name: name.clone(),
                line,
                reason,
            };

            let date_str = record.get(date_idx).unwrap_or_default();
            let event_date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|_| {
                invalid(EventError::Malformed {
                    field: "event_date",
                    value: date_str.to_string(),
                })
            })?;

            let symbol = record.get(symbol_idx).unwrap_or_default().to_uppercase();
            if symbol.is_empty() {
                return Err(invalid(EventError::EmptySymbol));
            }

            let signal_rank = match rank_idx.and_then(|i| record.get(i)) {
                None | Some("") => 0.0,
                Some(raw) => raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        invalid(EventError::Malformed {
                            field: "signal_rank",
                            value: raw.to_string(),
                        })
                    })?,
            };

            let bucket = bucket_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string();

            out.push(EventRow {
                line,
                event_date,
                symbol,
                signal_rank,
                bucket,
            });
        }
        tracing::info!(source, path = %path.display(), rows = out.len(), "event rows read");
        Ok(out)
    }
}

/// Writes run outputs as CSV.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

fn writer(path: &Path) -> Result<csv::Writer<File>, TiltbookError> {
    csv::Writer::from_path(path).map_err(|e| csv_to_io(path, e))
}

fn csv_to_io(path: &Path, e: csv::Error) -> TiltbookError {
    TiltbookError::Io(std::io::Error::other(format!(
        "failed to write {}: {e}",
        path.display()
    )))
}

impl ReportPort for CsvReportAdapter {
    fn write_weights(&self, rows: &[WeightRow], path: &Path) -> Result<(), TiltbookError> {
        let mut w = writer(path)?;
        w.write_record(["date", "symbol", "weight_base", "tilt_final", "weight_final"])
            .map_err(|e| csv_to_io(path, e))?;
        for row in rows {
            w.write_record([
                row.date.to_string(),
                row.symbol.clone(),
                row.weight_base.to_string(),
                row.tilt_final.to_string(),
                row.weight_final.to_string(),
            ])
            .map_err(|e| csv_to_io(path, e))?;
        }
        w.flush()?;
        Ok(())
    }

    fn write_daily(&self, records: &[DailyRecord], path: &Path) -> Result<(), TiltbookError> {
        let mut w = writer(path)?;
        w.write_record([
            "date",
            "gross_return",
            "cost",
            "net_return",
            "nav",
            "leverage",
            "regime_scale",
            "regime_state",
            "spike",
            "turnover",
            "drawdown",
            "active_events",
        ])
        .map_err(|e| csv_to_io(path, e))?;
        for r in records {
            w.write_record([
                r.date.to_string(),
                r.gross_return.to_string(),
                r.cost.to_string(),
                r.net_return.to_string(),
                r.nav.to_string(),
                r.leverage.to_string(),
                r.regime_scale.to_string(),
                r.regime_state.to_string(),
                r.spike.to_string(),
                r.turnover.to_string(),
                r.drawdown.to_string(),
                r.active_events.to_string(),
            ])
            .map_err(|e| csv_to_io(path, e))?;
        }
        w.flush()?;
        Ok(())
    }

    fn write_sweep(&self, report: &SweepReport, path: &Path) -> Result<(), TiltbookError> {
        let mut w = writer(path)?;
        w.write_record([
            "index",
            "params",
            "status",
            "sharpe",
            "sortino",
            "annualized_return",
            "annualized_vol",
            "max_drawdown",
            "calmar",
            "annualized_turnover",
            "annualized_cost",
            "error",
        ])
        .map_err(|e| csv_to_io(path, e))?;

        for row in &report.rows {
            let params = row
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            let record: Vec<String> = match &row.outcome {
                SweepOutcome::Completed(s) => vec![
                    row.index.to_string(),
                    params,
                    "completed".into(),
                    s.sharpe_ratio.to_string(),
                    s.sortino_ratio.to_string(),
                    s.annualized_return.to_string(),
                    s.annualized_vol.to_string(),
                    s.max_drawdown.to_string(),
                    s.calmar_ratio.to_string(),
                    s.annualized_turnover.to_string(),
                    s.annualized_cost.to_string(),
                    String::new(),
                ],
                SweepOutcome::Failed(reason) => {
                    let mut r = vec![row.index.to_string(), params, "failed".into()];
                    r.extend(std::iter::repeat_n(String::new(), 8));
                    r.push(reason.clone());
                    r
                }
                // Skipped combinations produced nothing.
                SweepOutcome::Skipped => continue,
            };
            w.write_record(&record).map_err(|e| csv_to_io(path, e))?;
        }
        w.flush()?;
        Ok(())
    }
}
