use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Error, Write},
    path::Path,
};

use crate::{
    backtest::BacktestEngine,
    types::{AssetId, Timestamp},
};

const MICROS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0 * 1e6;

/// A sampled point of the portfolio state for one asset.
#[derive(Clone, Debug)]
struct Record {
    timestamp: Timestamp,
    equity: f64,
    position: f64,
    mid_price: f64,
}

/// Samples the engine state on a fixed interval and derives risk/return metrics from the equity
/// curve.
pub struct BacktestRecorder {
    interval: Timestamp,
    last_timestamp: Option<Timestamp>,
    equity: Vec<(Timestamp, f64)>,
    values: HashMap<AssetId, Vec<Record>>,
}

impl BacktestRecorder {
    /// Constructs a recorder sampling at most once per `interval` microseconds.
    pub fn new(interval: Timestamp) -> Self {
        Self {
            interval,
            last_timestamp: None,
            equity: Vec::new(),
            values: HashMap::new(),
        }
    }

    /// Records the current state if at least one interval has passed since the last sample.
    pub fn record(&mut self, engine: &BacktestEngine) {
        let timestamp = engine.current_time();
        if let Some(last) = self.last_timestamp {
            if timestamp < last + self.interval {
                return;
            }
        }
        self.last_timestamp = Some(timestamp);
        let equity = engine.equity();
        self.equity.push((timestamp, equity));
        for asset_id in engine.asset_ids() {
            let depth = engine.depth(asset_id);
            self.values.entry(asset_id).or_default().push(Record {
                timestamp,
                equity,
                position: engine.position(asset_id),
                mid_price: depth.mid_price(),
            });
        }
    }

    /// Returns simple per-interval returns of the equity curve.
    pub fn interval_returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .filter_map(|pair| {
                let (_, previous) = pair[0];
                let (_, current) = pair[1];
                if previous != 0.0 {
                    Some((current - previous) / previous.abs())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Annualized Sharpe ratio of the interval returns, or `0.0` with fewer than two samples or
    /// zero variance.
    pub fn sharpe(&self) -> f64 {
        let returns = self.interval_returns();
        let std = std_dev(&returns);
        if std == 0.0 {
            return 0.0;
        }
        mean(&returns) / std * self.intervals_per_year().sqrt()
    }

    /// Annualized Sortino ratio: like Sharpe but penalizing downside deviation only.
    pub fn sortino(&self) -> f64 {
        let returns = self.interval_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let downside: Vec<f64> = returns.iter().map(|&r| r.min(0.0)).collect();
        let downside_dev = (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64)
            .sqrt();
        if downside_dev == 0.0 {
            return 0.0;
        }
        mean(&returns) / downside_dev * self.intervals_per_year().sqrt()
    }

    /// Largest peak-to-trough equity decline as a fraction of the peak.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0f64;
        for &(_, equity) in &self.equity {
            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }
        max_drawdown
    }

    /// Prints the performance summary to stdout.
    pub fn print_performance_metrics(&self) {
        println!("=== Performance Metrics ===");
        println!("Samples        : {}", self.equity.len());
        println!("Sharpe         : {:.4}", self.sharpe());
        println!("Sortino        : {:.4}", self.sortino());
        println!("Max Drawdown   : {:.4}", self.max_drawdown());
        println!("===========================");
    }

    /// Saves the sampled records into one CSV file per asset, named `{prefix}{asset_id}.csv`.
    /// The columns are `timestamp,equity,position,mid_price`.
    pub fn to_csv<Prefix, P>(&self, prefix: Prefix, path: P) -> Result<(), Error>
    where
        Prefix: AsRef<str>,
        P: AsRef<Path>,
    {
        let prefix = prefix.as_ref();
        for (asset_id, values) in self.values.iter() {
            let file_path = path.as_ref().join(format!("{prefix}{asset_id}.csv"));
            let mut file = BufWriter::new(File::create(file_path)?);
            writeln!(file, "timestamp,equity,position,mid_price")?;
            for Record {
                timestamp,
                equity,
                position,
                mid_price,
            } in values
            {
                writeln!(file, "{timestamp},{equity},{position},{mid_price}")?;
            }
        }
        Ok(())
    }

    fn intervals_per_year(&self) -> f64 {
        if self.interval == 0 {
            return 0.0;
        }
        MICROS_PER_YEAR / self.interval as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    (values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}
