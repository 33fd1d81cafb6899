//! Replay Terminal
//!
//! A [`Terminal`] backed by CSV bar files, for running the client without a live
//! terminal process.
//!
//! Bars are read from `<dir>/<SYMBOL>_<TF>.csv` (e.g. `EURUSD_M1.csv`) with the
//! header `time,open,high,low,close,tick_volume,spread,real_volume`, `time` in
//! epoch seconds. Each series can be revealed progressively: it starts with
//! [`ReplayOptions::initial_bars`] visible and every `copy_rates_from_pos` call
//! reveals [`ReplayOptions::reveal_per_poll`] more, which makes the streamer
//! see new bars arrive.
//!
//! Orders are filled against the last visible bar of the symbol's finest
//! available timeframe: market orders become a deal and a position at once,
//! pending orders stay working.

use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::models::*;
use super::*;
use crate::market::Timeframe;
use crate::result::LastError;

/// Errors loading replay data
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("replay directory {0:?} not found")]
    MissingDir(PathBuf),

    #[error("no bar file for {symbol} {timeframe} at {path:?}")]
    MissingSeries {
        symbol: String,
        timeframe: Timeframe,
        path: PathBuf,
    },

    #[error("unsupported timeframe code {0}")]
    UnknownTimeframe(u32),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Replay behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    /// Bars visible when a series is first loaded (`None` = all of them)
    pub initial_bars: Option<usize>,
    /// Bars revealed by every `copy_rates_from_pos` call
    pub reveal_per_poll: usize,
    /// Price of one spread point
    pub point: f64,
    pub balance: f64,
    pub leverage: u32,
    pub currency: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            initial_bars: None,
            reveal_per_poll: 0,
            point: 0.00001,
            balance: 10_000.0,
            leverage: 100,
            currency: "USD".to_string(),
        }
    }
}

/// Bars of one (symbol, timeframe) pair
#[derive(Debug, Clone)]
struct Series {
    rows: Vec<RateRow>,
    visible: usize,
}

impl Series {
    fn visible_rows(&self) -> &[RateRow] {
        &self.rows[..self.visible]
    }

    fn reveal(&mut self, n: usize) {
        self.visible = (self.visible + n).min(self.rows.len());
    }
}

const ORDER_STATE_PLACED: u32 = 1;
const ORDER_STATE_FILLED: u32 = 4;
const DEAL_TYPE_BUY: u32 = 0;
const DEAL_TYPE_SELL: u32 = 1;

/// CSV-backed terminal
pub struct ReplayTerminal {
    dir: PathBuf,
    options: ReplayOptions,
    connected: bool,
    last_error: LastError,
    series: HashMap<(String, Timeframe), Series>,
    next_ticket: u64,
    open_orders: Vec<TradeOrder>,
    positions: Vec<TradePosition>,
    deals: Vec<TradeDeal>,
    order_history: Vec<TradeOrder>,
}

impl ReplayTerminal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_options(dir, ReplayOptions::default())
    }

    pub fn with_options(dir: impl Into<PathBuf>, options: ReplayOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
            connected: false,
            last_error: LastError::new(RES_S_OK, "Success"),
            series: HashMap::new(),
            next_ticket: 1000,
            open_orders: Vec::new(),
            positions: Vec::new(),
            deals: Vec::new(),
            order_history: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn series_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", symbol, timeframe))
    }

    /// Load a series up front. Returns the number of bars in the file.
    pub fn preload(&mut self, symbol: &str, timeframe: Timeframe) -> Result<usize, ReplayError> {
        self.ensure_loaded(symbol, timeframe)
    }

    fn ensure_loaded(&mut self, symbol: &str, timeframe: Timeframe) -> Result<usize, ReplayError> {
        let path = self.series_path(symbol, timeframe);
        let series = match self.series.entry((symbol.to_string(), timeframe)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let rows = read_rates(&path, symbol, timeframe)?;
                let visible = self
                    .options
                    .initial_bars
                    .map_or(rows.len(), |n| n.min(rows.len()));
                debug!(
                    "Loaded {} {} bars for {} ({} visible)",
                    rows.len(),
                    timeframe,
                    symbol,
                    visible
                );
                entry.insert(Series { rows, visible })
            }
        };
        Ok(series.rows.len())
    }

    fn set_ok(&mut self) {
        self.last_error = LastError::new(RES_S_OK, "Success");
    }

    fn set_error(&mut self, code: i32, message: impl Into<String>) {
        self.last_error = LastError::new(code, message);
    }

    /// Common entry of every data call: connection check plus series lookup.
    fn visible_series(&mut self, symbol: &str, timeframe: u32) -> Option<&mut Series> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }

        let Some(timeframe) = Timeframe::from_terminal_code(timeframe) else {
            self.set_error(
                RES_E_INVALID_PARAMS,
                ReplayError::UnknownTimeframe(timeframe).to_string(),
            );
            return None;
        };

        if let Err(err) = self.ensure_loaded(symbol, timeframe) {
            self.set_error(RES_E_NOT_FOUND, err.to_string());
            return None;
        }
        self.set_ok();
        self.series.get_mut(&(symbol.to_string(), timeframe))
    }

    /// Last visible bar on the finest timeframe available for `symbol`.
    fn latest_bar(&mut self, symbol: &str) -> Option<RateRow> {
        Timeframe::ALL.into_iter().find_map(|tf| {
            self.ensure_loaded(symbol, tf).ok()?;
            self.series
                .get(&(symbol.to_string(), tf))
                .and_then(|series| series.visible_rows().last().copied())
        })
    }

    fn quote(&mut self, symbol: &str) -> Option<Tick> {
        let bar = self.latest_bar(symbol)?;
        let spread = bar.spread.max(0) as f64 * self.options.point;
        Some(Tick {
            time: bar.time,
            bid: bar.close,
            ask: bar.close + spread,
            last: bar.close,
            volume: bar.tick_volume,
            time_msc: bar.time * 1000,
        })
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn send_result(retcode: u32, comment: &str, tick: Option<&Tick>) -> OrderSendResult {
        OrderSendResult {
            retcode,
            deal: 0,
            order: 0,
            volume: 0.0,
            price: 0.0,
            bid: tick.map_or(0.0, |t| t.bid),
            ask: tick.map_or(0.0, |t| t.ask),
            comment: comment.to_string(),
            request_id: 0,
            retcode_external: 0,
        }
    }

    fn order_record(request: &TradeRequest, ticket: u64, time: i64, price: f64, state: u32) -> TradeOrder {
        TradeOrder {
            ticket,
            time_setup: time,
            order_type: request.order_type,
            state,
            type_time: request.type_time,
            type_filling: request.type_filling,
            magic: request.magic.unwrap_or(0),
            volume_initial: request.volume,
            volume_current: if state == ORDER_STATE_FILLED {
                0.0
            } else {
                request.volume
            },
            price_open: price,
            sl: request.sl.unwrap_or(0.0),
            tp: request.tp.unwrap_or(0.0),
            price_current: price,
            symbol: request.symbol.clone(),
            comment: request.comment.clone().unwrap_or_default(),
            external_id: request.external_id.clone().unwrap_or_default(),
        }
    }

    fn fill_market(&mut self, request: &TradeRequest, tick: &Tick) -> OrderSendResult {
        let is_buy = request.order_type == ORDER_TYPE_BUY;
        let price = if is_buy { tick.ask } else { tick.bid };
        let order_ticket = self.ticket();
        let deal_ticket = self.ticket();

        self.order_history.push(Self::order_record(
            request,
            order_ticket,
            tick.time,
            price,
            ORDER_STATE_FILLED,
        ));
        self.deals.push(TradeDeal {
            ticket: deal_ticket,
            order: order_ticket,
            time: tick.time,
            deal_type: if is_buy { DEAL_TYPE_BUY } else { DEAL_TYPE_SELL },
            magic: request.magic.unwrap_or(0),
            position_id: order_ticket,
            volume: request.volume,
            price,
            commission: 0.0,
            profit: 0.0,
            symbol: request.symbol.clone(),
            comment: request.comment.clone().unwrap_or_default(),
            external_id: request.external_id.clone().unwrap_or_default(),
        });
        self.positions.push(TradePosition {
            ticket: order_ticket,
            time: tick.time,
            position_type: if is_buy { 0 } else { 1 },
            magic: request.magic.unwrap_or(0),
            volume: request.volume,
            price_open: price,
            sl: request.sl.unwrap_or(0.0),
            tp: request.tp.unwrap_or(0.0),
            price_current: price,
            profit: 0.0,
            symbol: request.symbol.clone(),
            comment: request.comment.clone().unwrap_or_default(),
            external_id: request.external_id.clone().unwrap_or_default(),
        });

        info!(
            "Replay fill: {} {} {} @ {} (deal {})",
            if is_buy { "BUY" } else { "SELL" },
            request.volume,
            request.symbol,
            price,
            deal_ticket
        );

        OrderSendResult {
            deal: deal_ticket,
            order: order_ticket,
            volume: request.volume,
            price,
            ..Self::send_result(TRADE_RETCODE_DONE, "Request executed", Some(tick))
        }
    }

    fn place_pending(&mut self, request: &TradeRequest, tick: &Tick, price: f64) -> OrderSendResult {
        let ticket = self.ticket();
        let order = Self::order_record(request, ticket, tick.time, price, ORDER_STATE_PLACED);
        self.order_history.push(order.clone());
        self.open_orders.push(order);

        info!(
            "Replay pending order {}: {} {} @ {}",
            ticket, request.volume, request.symbol, price
        );

        OrderSendResult {
            order: ticket,
            volume: request.volume,
            price,
            ..Self::send_result(TRADE_RETCODE_DONE, "Request executed", Some(tick))
        }
    }

    fn in_window(time: i64, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> bool {
        time >= date_from.timestamp() && time <= date_to.timestamp()
    }
}

fn read_rates(path: &Path, symbol: &str, timeframe: Timeframe) -> Result<Vec<RateRow>, ReplayError> {
    if !path.exists() {
        return Err(ReplayError::MissingSeries {
            symbol: symbol.to_string(),
            timeframe,
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: RateRow = result.map_err(|source| ReplayError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }

    rows.sort_by_key(|r| r.time);
    Ok(rows)
}

impl Terminal for ReplayTerminal {
    fn initialize(&mut self) -> bool {
        if !self.dir.is_dir() {
            let err = ReplayError::MissingDir(self.dir.clone());
            self.set_error(RES_E_INTERNAL_FAIL_INIT, err.to_string());
            return false;
        }

        info!("Replay terminal reading bars from {:?}", self.dir);
        self.connected = true;
        self.set_ok();
        true
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }

    fn last_error(&self) -> LastError {
        self.last_error.clone()
    }

    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe: u32,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<RateRow>> {
        let series = self.visible_series(symbol, timeframe)?;
        Some(
            series
                .visible_rows()
                .iter()
                .filter(|r| Self::in_window(r.time, date_from, date_to))
                .copied()
                .collect(),
        )
    }

    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe: u32,
        start_pos: usize,
        count: usize,
    ) -> Option<Vec<RateRow>> {
        let reveal = self.options.reveal_per_poll;
        let series = self.visible_series(symbol, timeframe)?;
        series.reveal(reveal);

        let rows = series.visible_rows();
        let end = rows.len().saturating_sub(start_pos);
        let start = end.saturating_sub(count);
        Some(rows[start..end].to_vec())
    }

    fn copy_rates_from(
        &mut self,
        symbol: &str,
        timeframe: u32,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> Option<Vec<RateRow>> {
        let series = self.visible_series(symbol, timeframe)?;
        let rows = series.visible_rows();
        let end = rows.partition_point(|r| r.time <= date_from.timestamp());
        let start = end.saturating_sub(count);
        Some(rows[start..end].to_vec())
    }

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Tick> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        match self.quote(symbol) {
            Some(tick) => {
                self.set_ok();
                Some(tick)
            }
            None => {
                self.set_error(RES_E_NOT_FOUND, format!("Terminal: no bars for {}", symbol));
                None
            }
        }
    }

    fn order_send(&mut self, request: &TradeRequest) -> Option<OrderSendResult> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        if request.volume <= 0.0 {
            self.set_error(RES_E_INVALID_PARAMS, "Invalid \"volume\" argument");
            return None;
        }
        self.set_ok();

        let Some(tick) = self.quote(&request.symbol) else {
            return Some(Self::send_result(TRADE_RETCODE_INVALID_PRICE, "No prices", None));
        };

        match request.action {
            TRADE_ACTION_DEAL => Some(self.fill_market(request, &tick)),
            TRADE_ACTION_PENDING => match request.price {
                Some(price) if price > 0.0 => Some(self.place_pending(request, &tick, price)),
                _ => Some(Self::send_result(
                    TRADE_RETCODE_INVALID_PRICE,
                    "Invalid price",
                    Some(&tick),
                )),
            },
            _ => Some(Self::send_result(
                TRADE_RETCODE_REJECT,
                "Unsupported trade action",
                Some(&tick),
            )),
        }
    }

    fn account_info(&mut self) -> Option<AccountInfo> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        self.set_ok();

        let balance = self.options.balance;
        Some(AccountInfo {
            login: 1,
            leverage: self.options.leverage,
            balance,
            credit: 0.0,
            profit: 0.0,
            equity: balance,
            margin: 0.0,
            margin_free: balance,
            name: "Replay".to_string(),
            server: self.dir.display().to_string(),
            currency: self.options.currency.clone(),
            company: "Replay".to_string(),
        })
    }

    fn orders_get(&mut self) -> Option<Vec<TradeOrder>> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        self.set_ok();
        Some(self.open_orders.clone())
    }

    fn positions_get(&mut self) -> Option<Vec<TradePosition>> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        self.set_ok();
        Some(self.positions.clone())
    }

    fn history_deals_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeDeal>> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        self.set_ok();
        Some(
            self.deals
                .iter()
                .filter(|d| Self::in_window(d.time, date_from, date_to))
                .cloned()
                .collect(),
        )
    }

    fn history_orders_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeOrder>> {
        if !self.connected {
            self.set_error(RES_E_INTERNAL_FAIL_CONNECT, "Terminal: Not initialized");
            return None;
        }
        self.set_ok();
        Some(
            self.order_history
                .iter()
                .filter(|o| Self::in_window(o.time_setup, date_from, date_to))
                .cloned()
                .collect(),
        )
    }
}
