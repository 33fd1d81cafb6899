//! Trading terminal seam
//!
//! The terminal is an external process; this module fixes the surface the
//! client talks to and the wire constants that surface uses.
//!
//! # Components
//!
//! - [`Terminal`] - the terminal API as a trait
//! - [`models`] - request/record types exchanged with the terminal
//! - [`replay`] - CSV-backed terminal for offline use
//!
//! Calls follow the terminal's convention: a failed call returns `None` and the
//! reason is read back through [`Terminal::last_error`].

pub mod models;
pub mod replay;

#[cfg(test)]
pub(crate) mod fake;

use chrono::{DateTime, Utc};

use crate::result::LastError;
use models::*;

pub use replay::{ReplayError, ReplayTerminal};

/// `last_error` code for success
pub const RES_S_OK: i32 = 1;
/// Generic failure
pub const RES_E_FAIL: i32 = -1;
/// Invalid arguments
pub const RES_E_INVALID_PARAMS: i32 = -2;
/// Requested data not found
pub const RES_E_NOT_FOUND: i32 = -4;
/// Terminal initialization failed
pub const RES_E_INTERNAL_FAIL_INIT: i32 = -10003;
/// No IPC connection to the terminal
pub const RES_E_INTERNAL_FAIL_CONNECT: i32 = -10004;

/// `order_send` return code for a completed request
pub const TRADE_RETCODE_DONE: u32 = 10009;
/// Request rejected
pub const TRADE_RETCODE_REJECT: u32 = 10006;
/// No quotes to process the request
pub const TRADE_RETCODE_INVALID_PRICE: u32 = 10015;

pub const ORDER_TYPE_BUY: u32 = 0;
pub const ORDER_TYPE_SELL: u32 = 1;
pub const ORDER_TYPE_BUY_LIMIT: u32 = 2;
pub const ORDER_TYPE_SELL_LIMIT: u32 = 3;

pub const TRADE_ACTION_DEAL: u32 = 1;
pub const TRADE_ACTION_PENDING: u32 = 5;

pub const ORDER_TIME_GTC: u32 = 0;

pub const ORDER_FILLING_FOK: u32 = 0;
pub const ORDER_FILLING_IOC: u32 = 1;
pub const ORDER_FILLING_RETURN: u32 = 2;

/// Trading terminal API
///
/// Implementations own the connection to the terminal process. Rate rows are
/// returned oldest first.
pub trait Terminal {
    /// Establish the connection. Returns `false` on failure.
    fn initialize(&mut self) -> bool;

    fn shutdown(&mut self);

    fn last_error(&self) -> LastError;

    /// Bars with open time in `[date_from, date_to]`.
    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe: u32,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<RateRow>>;

    /// `count` bars ending `start_pos` bars before the current one (0 = current bar).
    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe: u32,
        start_pos: usize,
        count: usize,
    ) -> Option<Vec<RateRow>>;

    /// `count` bars with open time at or before `date_from`.
    fn copy_rates_from(
        &mut self,
        symbol: &str,
        timeframe: u32,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> Option<Vec<RateRow>>;

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Tick>;

    fn order_send(&mut self, request: &TradeRequest) -> Option<OrderSendResult>;

    fn account_info(&mut self) -> Option<AccountInfo>;

    fn orders_get(&mut self) -> Option<Vec<TradeOrder>>;

    fn positions_get(&mut self) -> Option<Vec<TradePosition>>;

    fn history_deals_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeDeal>>;

    fn history_orders_get(
        &mut self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> Option<Vec<TradeOrder>>;
}
