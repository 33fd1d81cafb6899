//! Terminal Data Models
//!
//! Records exchanged with the terminal. Field names follow the terminal's own
//! schema, which is a fixed external contract.

use serde::{Deserialize, Serialize};

// ============================================================================
// Market Data
// ============================================================================

/// One row of `copy_rates_*` output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    /// Bar open time, seconds since epoch
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: u64,
    /// Spread in points
    pub spread: i32,
    pub real_volume: u64,
}

/// Last tick of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Seconds since epoch
    pub time: i64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
    /// Milliseconds since epoch
    pub time_msc: i64,
}

// ============================================================================
// Orders
// ============================================================================

/// Request passed to `order_send`
///
/// Optional fields are omitted from the request when `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// TRADE_ACTION_* code
    pub action: u32,
    pub symbol: String,
    pub volume: f64,
    /// ORDER_TYPE_* code
    #[serde(rename = "type")]
    pub order_type: u32,
    /// Maximum price deviation in points
    pub deviation: u32,
    /// ORDER_TIME_* code
    pub type_time: u32,
    /// ORDER_FILLING_* code
    pub type_filling: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp: Option<f64>,
    /// Caller-side identifier forwarded to the terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Expert advisor id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Result of `order_send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSendResult {
    /// TRADE_RETCODE_* code
    pub retcode: u32,
    /// Deal ticket, if a deal was performed
    pub deal: u64,
    /// Order ticket, if an order was placed
    pub order: u64,
    pub volume: f64,
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
    /// Broker comment on the result
    pub comment: String,
    pub request_id: u32,
    pub retcode_external: i32,
}

/// Working or historical order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub ticket: u64,
    pub time_setup: i64,
    /// ORDER_TYPE_* code
    #[serde(rename = "type")]
    pub order_type: u32,
    /// ORDER_STATE_* code
    pub state: u32,
    pub type_time: u32,
    pub type_filling: u32,
    pub magic: u64,
    pub volume_initial: f64,
    pub volume_current: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub price_current: f64,
    pub symbol: String,
    pub comment: String,
    pub external_id: String,
}

// ============================================================================
// Positions & Deals
// ============================================================================

/// Open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePosition {
    pub ticket: u64,
    pub time: i64,
    /// POSITION_TYPE_BUY (0) or POSITION_TYPE_SELL (1)
    #[serde(rename = "type")]
    pub position_type: u32,
    pub magic: u64,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub price_current: f64,
    pub profit: f64,
    pub symbol: String,
    pub comment: String,
    pub external_id: String,
}

/// Executed deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDeal {
    pub ticket: u64,
    pub order: u64,
    pub time: i64,
    /// DEAL_TYPE_* code
    #[serde(rename = "type")]
    pub deal_type: u32,
    pub magic: u64,
    pub position_id: u64,
    pub volume: f64,
    pub price: f64,
    pub commission: f64,
    pub profit: f64,
    pub symbol: String,
    pub comment: String,
    pub external_id: String,
}

// ============================================================================
// Account
// ============================================================================

/// Trading account state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub leverage: u32,
    pub balance: f64,
    pub credit: f64,
    pub profit: f64,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    pub name: String,
    pub server: String,
    pub currency: String,
    pub company: String,
}
