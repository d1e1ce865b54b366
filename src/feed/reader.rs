use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use tracing::warn;

use crate::{
    backtest::BacktestError,
    types::{BookUpdate, Side, Timestamp, Trade, UpdateKind},
};

/// Header-driven column lookup shared by the CSV stream readers. Extra columns are ignored and
/// column order is free, as long as the required names are present.
struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    fn from_header(header: &str) -> Self {
        let indices = header
            .trim()
            .split(',')
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();
        Self { indices }
    }

    fn get<'a>(&self, fields: &'a [&'a str], name: &str) -> Option<&'a str> {
        self.indices
            .get(name)
            .and_then(|&index| fields.get(index))
            .map(|field| field.trim())
    }

    fn has(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }
}

fn open_lines(path: &Path) -> Result<(Lines<BufReader<File>>, ColumnMap), BacktestError> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    let header = lines.next().transpose()?.unwrap_or_default();
    Ok((lines, ColumnMap::from_header(&header)))
}

/// Streams [`BookUpdate`]s from a CSV file with columns
/// `timestamp,local_timestamp,is_snapshot,side,price,amount`.
///
/// Rows with a blank side or malformed fields are skipped with a warning. When the
/// `local_timestamp` column is absent, it is synthesised as
/// `timestamp + market_feed_latency`.
pub struct BookStreamReader {
    lines: Lines<BufReader<File>>,
    columns: ColumnMap,
    has_local_timestamp: bool,
    market_feed_latency: Timestamp,
    path: String,
}

impl BookStreamReader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        market_feed_latency: Timestamp,
    ) -> Result<Self, BacktestError> {
        let (lines, columns) = open_lines(path.as_ref())?;
        let has_local_timestamp = columns.has("local_timestamp");
        Ok(Self {
            lines,
            columns,
            has_local_timestamp,
            market_feed_latency,
            path: path.as_ref().display().to_string(),
        })
    }

    fn parse_row(&self, line: &str) -> Option<BookUpdate> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        let side = match self.columns.get(&fields, "side")? {
            "bid" => Side::Buy,
            "ask" => Side::Sell,
            _ => return None,
        };
        let exch_timestamp: Timestamp = self.columns.get(&fields, "timestamp")?.parse().ok()?;
        let local_timestamp = if self.has_local_timestamp {
            self.columns.get(&fields, "local_timestamp")?.parse().ok()?
        } else {
            exch_timestamp + self.market_feed_latency
        };
        let kind = match self.columns.get(&fields, "is_snapshot") {
            Some("true") | Some("1") => UpdateKind::Snapshot,
            _ => UpdateKind::Incremental,
        };
        let price: f64 = self.columns.get(&fields, "price")?.parse().ok()?;
        let qty: f64 = self.columns.get(&fields, "amount")?.parse().ok()?;
        Some(BookUpdate {
            exch_timestamp,
            local_timestamp,
            kind,
            side,
            price,
            qty,
        })
    }
}

impl Iterator for BookStreamReader {
    type Item = BookUpdate;

    fn next(&mut self) -> Option<BookUpdate> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(error) => {
                    warn!(file = %self.path, %error, "stopping book stream on read error");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_row(&line) {
                Some(update) => return Some(update),
                None => {
                    warn!(file = %self.path, row = %line, "skipped malformed book row");
                }
            }
        }
    }
}

/// Streams [`Trade`]s from a CSV file with columns
/// `timestamp,local_timestamp,id,side,price,amount`. The side column is the taker side.
pub struct TradeStreamReader {
    lines: Lines<BufReader<File>>,
    columns: ColumnMap,
    has_local_timestamp: bool,
    market_feed_latency: Timestamp,
    path: String,
}

impl TradeStreamReader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        market_feed_latency: Timestamp,
    ) -> Result<Self, BacktestError> {
        let (lines, columns) = open_lines(path.as_ref())?;
        let has_local_timestamp = columns.has("local_timestamp");
        Ok(Self {
            lines,
            columns,
            has_local_timestamp,
            market_feed_latency,
            path: path.as_ref().display().to_string(),
        })
    }

    fn parse_row(&self, line: &str) -> Option<Trade> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        let side = match self.columns.get(&fields, "side")? {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => return None,
        };
        let exch_timestamp: Timestamp = self.columns.get(&fields, "timestamp")?.parse().ok()?;
        let local_timestamp = if self.has_local_timestamp {
            self.columns.get(&fields, "local_timestamp")?.parse().ok()?
        } else {
            exch_timestamp + self.market_feed_latency
        };
        let trade_id = self
            .columns
            .get(&fields, "id")
            .and_then(|field| field.parse().ok())
            .unwrap_or(0);
        let price: f64 = self.columns.get(&fields, "price")?.parse().ok()?;
        let qty: f64 = self.columns.get(&fields, "amount")?.parse().ok()?;
        Some(Trade {
            exch_timestamp,
            local_timestamp,
            trade_id,
            side,
            price,
            qty,
        })
    }
}

impl Iterator for TradeStreamReader {
    type Item = Trade;

    fn next(&mut self) -> Option<Trade> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(error) => {
                    warn!(file = %self.path, %error, "stopping trade stream on read error");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_row(&line) {
                Some(trade) => return Some(trade),
                None => {
                    warn!(file = %self.path, row = %line, "skipped malformed trade row");
                }
            }
        }
    }
}
