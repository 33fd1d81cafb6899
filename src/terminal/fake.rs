//! Scripted terminal for unit tests.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use super::models::*;
use super::{Terminal, RES_E_FAIL, RES_S_OK};
use crate::result::LastError;

/// Scripted answer to one `copy_rates_from_pos` call.
#[derive(Debug, Clone)]
pub enum Poll {
    Rows(Vec<RateRow>),
    Fail(LastError),
}

pub fn rate(time: i64, close: f64) -> RateRow {
    RateRow {
        time,
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        tick_volume: 100,
        spread: 1,
        real_volume: 0,
    }
}

/// `count` one-minute rows starting at `first`.
pub fn rates(first: i64, count: usize) -> Vec<RateRow> {
    (0..count)
        .map(|i| rate(first + 60 * i as i64, 100.0 + i as f64))
        .collect()
}

pub fn send_result(retcode: u32, comment: &str) -> OrderSendResult {
    OrderSendResult {
        retcode,
        deal: 0,
        order: 7001,
        volume: 0.1,
        price: 1.1,
        bid: 1.1,
        ask: 1.1002,
        comment: comment.to_string(),
        request_id: 1,
        retcode_external: 0,
    }
}

/// Terminal whose answers are set up front and whose calls are recorded.
pub struct ScriptedTerminal {
    pub init_ok: bool,
    pub init_calls: usize,
    pub shutdown_calls: usize,
    /// Calls to anything other than initialize/shutdown/last_error
    pub data_calls: usize,
    pub last_error: LastError,
    pub init_error: LastError,

    pub range_rates: Option<Vec<RateRow>>,
    pub range_args: Vec<(String, u32, DateTime<Utc>, DateTime<Utc>)>,
    pub from_rates: Option<Vec<RateRow>>,
    pub pos_script: HashMap<String, VecDeque<Poll>>,
    pub pos_last: HashMap<String, Poll>,
    pub pos_args: Vec<(String, u32, usize, usize)>,

    pub tick: Option<Tick>,
    pub send_result: Option<OrderSendResult>,
    pub requests: Vec<TradeRequest>,

    pub account: Option<AccountInfo>,
    pub orders: Option<Vec<TradeOrder>>,
    pub positions: Option<Vec<TradePosition>>,
    pub deals: Option<Vec<TradeDeal>>,
    pub history_orders: Option<Vec<TradeOrder>>,
    pub history_args: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ScriptedTerminal {
    pub fn new() -> Self {
        Self {
            init_ok: true,
            init_calls: 0,
            shutdown_calls: 0,
            data_calls: 0,
            last_error: LastError::new(RES_S_OK, "Success"),
            init_error: LastError::new(-10003, "IPC initialize failed, MetaTrader 5 x64 not found"),
            range_rates: Some(Vec::new()),
            range_args: Vec::new(),
            from_rates: Some(Vec::new()),
            pos_script: HashMap::new(),
            pos_last: HashMap::new(),
            pos_args: Vec::new(),
            tick: None,
            send_result: None,
            requests: Vec::new(),
            account: None,
            orders: Some(Vec::new()),
            positions: Some(Vec::new()),
            deals: Some(Vec::new()),
            history_orders: Some(Vec::new()),
            history_args: Vec::new(),
        }
    }

    pub fn failing_init() -> Self {
        Self {
            init_ok: false,
            ..Self::new()
        }
    }

    /// Queue answers for a symbol's `copy_rates_from_pos` calls. Once the queue
    /// runs dry the last answer is repeated.
    pub fn script(&mut self, symbol: &str, polls: Vec<Poll>) {
        self.pos_script
            .entry(symbol.to_string())
            .or_default()
            .extend(polls);
    }

    pub fn fail_with(&mut self, code: i32, message: &str) {
        self.last_error = LastError::new(code, message);
    }
}

impl Terminal for ScriptedTerminal {
    fn initialize(&mut self) -> bool {
        self.init_calls += 1;
        if !self.init_ok {
            self.last_error = self.init_error.clone();
        }
        self.init_ok
    }

    fn shutdown(&mut self) {
        self.shutdown_calls += 1;
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
        self.data_calls += 1;
        self.range_args
            .push((symbol.to_string(), timeframe, date_from, date_to));
        self.range_rates.clone()
    }

    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe: u32,
        start_pos: usize,
        count: usize,
    ) -> Option<Vec<RateRow>> {
        self.data_calls += 1;
        self.pos_args
            .push((symbol.to_string(), timeframe, start_pos, count));

        let next = self
            .pos_script
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front());
        let poll = match next {
            Some(poll) => {
                self.pos_last.insert(symbol.to_string(), poll.clone());
                poll
            }
            None => self
                .pos_last
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Poll::Fail(LastError::new(RES_E_FAIL, "no script"))),
        };

        match poll {
            Poll::Rows(rows) => {
                self.last_error = LastError::new(RES_S_OK, "Success");
                // The terminal only ever hands back the requested window
                let skip = rows.len().saturating_sub(count);
                Some(rows[skip..].to_vec())
            }
            Poll::Fail(err) => {
                self.last_error = err;
                None
            }
        }
    }

    fn copy_rates_from(
        &mut self,
        _symbol: &str,
        _timeframe: u32,
        _date_from: DateTime<Utc>,
        _count: usize,
    ) -> Option<Vec<RateRow>> {
        self.data_calls += 1;
        self.from_rates.clone()
    }

    fn symbol_info_tick(&mut self, _symbol: &str) -> Option<Tick> {
        self.data_calls += 1;
        self.tick
    }

    fn order_send(&mut self, request: &TradeRequest) -> Option<OrderSendResult> {
        self.data_calls += 1;
        self.requests.push(request.clone());
        self.send_result.clone()
    }

    fn account_info(&mut self) -> Option<AccountInfo> {
        self.data_calls += 1;
        self.account.clone()
    }

    fn orders_get(&mut self) -> Option<Vec<TradeOrder>> {
        self.data_calls += 1;
        self.orders.clone()
    }

    fn positions_get(&mut self) -> Option<Vec<TradePosition>> {
        self.data_calls += 1;
        self.positions.clone()
    }

    fn history_deals_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeDeal>> {
        self.data_calls += 1;
        self.history_args.push((date_from, date_to));
        self.deals.clone()
    }

    fn history_orders_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeOrder>> {
        self.data_calls += 1;
        self.history_args.push((date_from, date_to));
        self.history_orders.clone()
    }
}
