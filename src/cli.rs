//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::adapters::csv_adapter::{CsvAdapter, CsvReportAdapter, DataPaths};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_backtest, BacktestResult, PreparedMarket};
use crate::domain::config::RunConfig;
use crate::domain::config_loader::{build_param_grid, build_run_config, build_splits};
use crate::domain::error::TiltbookError;
use crate::domain::market_data::MarketData;
use crate::domain::metrics::{split_summaries, PerformanceSummary};
use crate::domain::sweep::ParamSweep;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tiltbook", about = "Event-driven tilt overlay backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Final weights CSV
        #[arg(short, long)]
        weights: Option<PathBuf>,
        /// Daily ledger CSV
        #[arg(short, long)]
        daily: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run every combination of the [sweep] section
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run combinations one at a time
        #[arg(long)]
        sequential: bool,
        /// Stop starting new combinations after this many seconds
        #[arg(long)]
        max_seconds: Option<u64>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            weights,
            daily,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest_command(&config, weights.as_deref(), daily.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Sweep {
            config,
            output,
            sequential,
            max_seconds,
        } => run_sweep(
            &config,
            output.as_deref(),
            sequential,
            max_seconds.map(Duration::from_secs),
        ),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = TiltbookError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(e: TiltbookError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

/// Input file locations from `[backtest]` and each `[source.<name>]`.
pub fn build_data_paths(
    adapter: &dyn ConfigPort,
    config: &RunConfig,
) -> Result<DataPaths, TiltbookError> {
    let required = |key: &str| {
        adapter
            .get_string("backtest", key)
            .map(PathBuf::from)
            .ok_or_else(|| TiltbookError::missing("backtest", key))
    };

    let mut events = HashMap::new();
    for source in &config.overlay.sources {
        let section = format!("source.{}", source.name);
        let path = adapter
            .get_string(&section, "events")
            .ok_or_else(|| TiltbookError::missing(&section, "events"))?;
        events.insert(source.name.clone(), PathBuf::from(path));
    }

    Ok(DataPaths {
        prices: required("prices")?,
        base_weights: required("base_weights")?,
        vol_index: adapter.get_string("backtest", "vol_index").map(PathBuf::from),
        adv: adapter.get_string("backtest", "adv").map(PathBuf::from),
        events,
    })
}

/// Loads the run config and its market data.
fn prepare(config_path: &Path) -> Result<(FileConfigAdapter, RunConfig, MarketData), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let run_config = build_run_config(&adapter).map_err(fail)?;
    let paths = build_data_paths(&adapter, &run_config).map_err(fail)?;

    if run_config.regime.enabled && paths.vol_index.is_none() {
        tracing::warn!("regime guard enabled without a vol_index file; exposure stays neutral");
    }

    let sources: Vec<String> = run_config
        .overlay
        .sources
        .iter()
        .map(|s| s.name.clone())
        .collect();
    let data = CsvAdapter::new(paths)
        .load_market_data(&sources)
        .map_err(fail)?;
    Ok((adapter, run_config, data))
}

fn run_backtest_command(
    config_path: &Path,
    weights_path: Option<&Path>,
    daily_path: Option<&Path>,
) -> ExitCode {
    let (adapter, run_config, data) = match prepare(config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let splits = match build_splits(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let market = match PreparedMarket::new(&data, run_config.start_date, run_config.end_date) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Running backtest: {} sources, {} sessions, {} to {}",
        run_config.overlay.sources.len(),
        market.timeline.len(),
        market.timeline.first().map_or_else(String::new, |d| d.to_string()),
        market.timeline.last().map_or_else(String::new, |d| d.to_string()),
    );

    let result = match run_backtest(&run_config, &market) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let summary = PerformanceSummary::from_result(&result, run_config.risk_free_rate);
    print_summary("Aggregate Results", &summary);
    for split in split_summaries(&result, &splits, run_config.risk_free_rate) {
        print_summary(&format!("Split: {}", split.name), &split.summary);
    }

    write_outputs(&result, weights_path, daily_path)
}

fn write_outputs(
    result: &BacktestResult,
    weights_path: Option<&Path>,
    daily_path: Option<&Path>,
) -> ExitCode {
    let reporter = CsvReportAdapter;
    let weights_path = weights_path.unwrap_or(Path::new("weights.csv"));
    if let Err(e) = reporter.write_weights(&result.weights, weights_path) {
        return fail(e);
    }
    eprintln!("\nWeights written to: {}", weights_path.display());

    if let Some(path) = daily_path {
        if let Err(e) = reporter.write_daily(&result.records, path) {
            return fail(e);
        }
        eprintln!("Daily ledger written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

pub fn print_summary(title: &str, s: &PerformanceSummary) {
    eprintln!("\n=== {title} ===");
    if let (Some(start), Some(end)) = (s.start, s.end) {
        eprintln!("Period:           {start} to {end} ({} sessions)", s.sessions);
    }
    eprintln!("Final NAV:        {:.2}", s.final_nav);
    eprintln!("Total Return:     {:.2}%", s.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", s.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", s.annualized_vol * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", s.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", s.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", s.max_drawdown * 100.0);
    eprintln!("Calmar Ratio:     {:.2}", s.calmar_ratio);
    eprintln!("Turnover (ann.):  {:.2}", s.annualized_turnover);
    eprintln!("Cost (ann.):      {:.2}%", s.annualized_cost * 100.0);
    eprintln!("Mean Leverage:    {:.2}", s.mean_leverage);
    eprintln!("Spike Days:       {}", s.spike_days);
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let run_config = match build_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let paths = match build_data_paths(&adapter, &run_config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    eprintln!("Config validated successfully");

    eprintln!("\nInputs:");
    eprintln!("  prices:       {}", paths.prices.display());
    eprintln!("  base_weights: {}", paths.base_weights.display());
    if let Some(p) = &paths.vol_index {
        eprintln!("  vol_index:    {}", p.display());
    }
    if let Some(p) = &paths.adv {
        eprintln!("  adv:          {}", p.display());
    }

    eprintln!("\nSources:");
    for source in &run_config.overlay.sources {
        eprintln!(
            "  {}: blend {:.2}, tilt {:.4}, horizon {}, events {}",
            source.name,
            source.blend_weight,
            source.tilt_size,
            source.horizon,
            paths.events[&source.name].display(),
        );
    }

    let risk = &run_config.risk;
    eprintln!("\nRisk:");
    eprintln!(
        "  target_vol {:.2}, leverage [{:.2}, {:.2}]",
        risk.target_vol, risk.min_leverage, risk.max_leverage
    );

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let run_config = match build_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Err(e) = build_data_paths(&adapter, &run_config) {
        return fail(e);
    }
    let splits = match build_splits(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let grid = match build_param_grid(&adapter, &run_config) {
        Ok(g) => g,
        Err(e) => return fail(e),
    };

    eprintln!("  sources: {}", run_config.overlay.sources.len());
    eprintln!("  splits:  {}", splits.len());
    eprintln!("  sweep:   {} combinations", grid.size());
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_sweep(
    config_path: &Path,
    output_path: Option<&Path>,
    sequential: bool,
    max_duration: Option<Duration>,
) -> ExitCode {
    let (adapter, run_config, data) = match prepare(config_path) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let grid = match build_param_grid(&adapter, &run_config) {
        Ok(g) => g,
        Err(e) => return fail(e),
    };

    let (combos, invalid) = grid.generate(&run_config);
    if invalid > 0 {
        eprintln!("warning: {invalid} invalid combinations skipped");
    }
    if combos.is_empty() {
        eprintln!("error: no valid sweep combinations");
        return ExitCode::from(2);
    }

    let market = match PreparedMarket::new(&data, run_config.start_date, run_config.end_date) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Running sweep: {} combinations over {} sessions",
        combos.len(),
        market.timeline.len()
    );

    let cancel = AtomicBool::new(false);
    let started = Instant::now();
    let report = ParamSweep::new()
        .with_parallelism(!sequential)
        .with_risk_free_rate(run_config.risk_free_rate)
        .run_with_progress(&combos, &market, Some(&cancel), |index, total| {
            tracing::debug!(index, total, "combination finished");
            if max_duration.is_some_and(|limit| started.elapsed() >= limit) {
                cancel.store(true, Ordering::Relaxed);
            }
        });

    if report.skipped() > 0 {
        eprintln!(
            "warning: time limit reached, {} combinations not run",
            report.skipped()
        );
    }

    if let Some((row, best)) = report.best_by_sharpe() {
        let params = row
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        print_summary(&format!("Best by Sharpe (#{}: {params})", row.index), best);
    }

    let output = output_path.unwrap_or(Path::new("sweep.csv"));
    if let Err(e) = CsvReportAdapter.write_sweep(&report, output) {
        return fail(e);
    }
    eprintln!("\nSweep results written to: {}", output.display());

    if report.failed() > 0 {
        eprintln!("warning: {} combinations failed", report.failed());
    }
    ExitCode::SUCCESS
}
