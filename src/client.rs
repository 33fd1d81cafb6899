//! Terminal Client
//!
//! Every operation runs through [`TerminalClient::guarded`], which makes sure the
//! terminal is initialized first and folds every failure into a
//! [`TerminalResult`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::TerminalError;
use crate::market::{Chart, Symbol, Timeframe};
use crate::order_type::OrderKind;
use crate::result::{LastError, TerminalResult, TickSnapshot};
use crate::terminal::models::*;
use crate::terminal::{
    Terminal, ORDER_FILLING_FOK, ORDER_FILLING_RETURN, ORDER_TIME_GTC, TRADE_RETCODE_DONE,
};

/// Boundary adjustments for [`TerminalClient::copy_rates_range`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Extend the end by one bar
    pub date_to_le: bool,
    /// Only bars after `date_to` (start moves to end plus one bar)
    pub date_from_gt: bool,
}

impl RangeOptions {
    /// Effective `(from, to)` sent to the terminal.
    pub fn apply(
        &self,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let mut date_from = date_from;
        let mut date_to = date_to;
        if self.date_to_le {
            date_to += timeframe.bar_duration();
        }
        if self.date_from_gt {
            date_from = date_to + timeframe.bar_duration();
        }
        (date_from, date_to)
    }
}

/// Optional order fields. Each one is sent only when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderParams {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub external_id: Option<String>,
    pub magic: Option<u64>,
    pub comment: Option<String>,
}

impl OrderParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn magic(mut self, magic: u64) -> Self {
        self.magic = Some(magic);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Time and filling policy of an order request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderPolicy {
    type_time: u32,
    type_filling: u32,
}

impl OrderPolicy {
    /// Good-till-cancelled, partial fills stay working
    const PENDING: Self = Self {
        type_time: ORDER_TIME_GTC,
        type_filling: ORDER_FILLING_RETURN,
    };

    /// Good-till-cancelled, fill completely or not at all
    const MARKET: Self = Self {
        type_time: ORDER_TIME_GTC,
        type_filling: ORDER_FILLING_FOK,
    };
}

fn build_trade_request(
    kind: OrderKind,
    symbol: &Symbol,
    volume: f64,
    deviation: u32,
    policy: OrderPolicy,
    entry_price: Option<f64>,
    params: &OrderParams,
) -> TradeRequest {
    if params.stop_loss.is_none() {
        warn!(
            "{} {} {} sent without a stop loss",
            kind, volume, symbol.full_name
        );
    }

    TradeRequest {
        action: kind.terminal_action(),
        symbol: symbol.full_name.clone(),
        volume,
        order_type: kind.terminal_type(),
        deviation,
        type_time: policy.type_time,
        type_filling: policy.type_filling,
        price: entry_price,
        sl: params.stop_loss,
        tp: params.take_profit,
        external_id: params.external_id.clone(),
        magic: params.magic,
        comment: params.comment.clone(),
    }
}

/// Default window for [`TerminalClient::deal_history`]: a year back through tomorrow.
pub fn default_deal_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::days(365), now + Duration::days(1))
}

/// Fixed window for [`TerminalClient::order_history`].
pub fn order_history_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

/// Client owning the terminal connection
pub struct TerminalClient<T: Terminal> {
    terminal: T,
    config: ClientConfig,
    initialized: bool,
}

impl<T: Terminal> TerminalClient<T> {
    pub fn new(terminal: T) -> Self {
        Self::with_config(terminal, ClientConfig::default())
    }

    pub fn with_config(terminal: T, config: ClientConfig) -> Self {
        Self {
            terminal,
            config,
            initialized: false,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    pub fn is_open(&self) -> bool {
        self.initialized
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the terminal connection
    pub fn open(&mut self) -> TerminalResult<()> {
        match self.ensure_initialized() {
            Ok(()) => TerminalResult::success(()),
            Err(last_error) => TerminalResult::from_last_error(last_error, None),
        }
    }

    /// Shut the terminal connection down. The next guarded call reopens it.
    pub fn close(&mut self) {
        if self.initialized {
            self.terminal.shutdown();
            self.initialized = false;
            info!("MT5 connection closed");
        }
    }

    fn ensure_initialized(&mut self) -> Result<(), LastError> {
        if self.initialized {
            return Ok(());
        }

        let init_result = self.terminal.initialize();
        info!("MT5 Initialize: {}", init_result);

        if !init_result {
            let last_error = self.last_error();
            // Some terminals report success even though initialize failed
            if !last_error.has_error() {
                return Err(LastError::new(
                    crate::terminal::RES_E_INTERNAL_FAIL_INIT,
                    "terminal initialization failed",
                ));
            }
            return Err(last_error);
        }

        self.initialized = true;
        Ok(())
    }

    fn last_error(&self) -> LastError {
        let last_error = self.terminal.last_error();
        info!("MT5 Response: {}", last_error);
        last_error
    }

    /// Run `body` against an initialized terminal.
    ///
    /// On initialization failure `body` never runs and the envelope carries the
    /// terminal's last error. A [`TerminalError`] from `body` is folded into an
    /// error envelope together with the terminal's last error.
    pub fn guarded<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<TerminalResult<R>, TerminalError>,
    ) -> TerminalResult<R> {
        if let Err(last_error) = self.ensure_initialized() {
            return TerminalResult::from_last_error(last_error, None);
        }

        match body(self) {
            Ok(result) => result,
            Err(err) => {
                let last_error = self.last_error();
                warn!("Terminal call failed: {}", err);
                TerminalResult::failure(
                    format!(" mt5 msg :{} , exception : {}", last_error.message, err),
                    last_error.code,
                    None,
                )
            }
        }
    }

    /// Wrap raw rows in a chart envelope.
    ///
    /// No rows and a failing last error is an I/O failure; no rows with a
    /// successful last error is an empty chart.
    fn chart_envelope(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        rows: Option<Vec<RateRow>>,
    ) -> Result<TerminalResult<Chart>, TerminalError> {
        let last_error = self.last_error();
        if rows.is_none() && last_error.has_error() {
            return Err(TerminalError::io(last_error.message, last_error.code));
        }

        let chart = Chart::from_rates(&symbol.name, rows.as_deref().unwrap_or_default(), timeframe);
        Ok(TerminalResult::from_last_error(last_error, Some(chart)))
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// Bars between two dates
    pub fn copy_rates_range(
        &mut self,
        symbol: &Symbol,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        options: RangeOptions,
    ) -> TerminalResult<Chart> {
        self.guarded(|client| {
            let (date_from, date_to) = options.apply(date_from, date_to, timeframe);
            debug!(
                "copy_rates_range {} {} {} -> {}",
                symbol.full_name, timeframe, date_from, date_to
            );

            let rows = client.terminal.copy_rates_range(
                &symbol.full_name,
                timeframe.terminal_code(),
                date_from,
                date_to,
            );
            client.chart_envelope(symbol, timeframe, rows)
        })
    }

    /// `count` bars ending `pos` bars before the current one
    pub fn copy_rates_from_pos(
        &mut self,
        symbol: &Symbol,
        timeframe: Timeframe,
        pos: usize,
        count: usize,
    ) -> TerminalResult<Chart> {
        self.rates_from_pos(&symbol.name, symbol, timeframe, pos, count)
    }

    /// Like [`copy_rates_from_pos`](Self::copy_rates_from_pos) but addressed by
    /// the symbol's full name, which is what the streamer polls.
    pub fn copy_latest_rates(
        &mut self,
        symbol: &Symbol,
        timeframe: Timeframe,
        pos: usize,
        count: usize,
    ) -> TerminalResult<Chart> {
        self.rates_from_pos(&symbol.full_name, symbol, timeframe, pos, count)
    }

    fn rates_from_pos(
        &mut self,
        terminal_name: &str,
        symbol: &Symbol,
        timeframe: Timeframe,
        pos: usize,
        count: usize,
    ) -> TerminalResult<Chart> {
        self.guarded(|client| {
            debug!(
                "copy_rates_from_pos {} {} pos={} count={}",
                terminal_name, timeframe, pos, count
            );

            let rows =
                client
                    .terminal
                    .copy_rates_from_pos(terminal_name, timeframe.terminal_code(), pos, count);
            client.chart_envelope(symbol, timeframe, rows)
        })
    }

    /// `count` bars up to `date_from`
    pub fn copy_rates_from(
        &mut self,
        symbol: &Symbol,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        count: usize,
    ) -> TerminalResult<Chart> {
        self.guarded(|client| {
            debug!(
                "copy_rates_from {} {} from={} count={}",
                symbol.name, timeframe, date_from, count
            );

            let rows = client.terminal.copy_rates_from(
                &symbol.name,
                timeframe.terminal_code(),
                date_from,
                count,
            );
            client.chart_envelope(symbol, timeframe, rows)
        })
    }

    fn last_tick(&mut self, symbol: &Symbol) -> Result<(Tick, LastError), TerminalError> {
        let tick = self.terminal.symbol_info_tick(&symbol.full_name);
        let last_error = self.last_error();
        match tick {
            Some(tick) => Ok((tick, last_error)),
            None => Err(TerminalError::io(
                format!("no tick for {}", symbol.full_name),
                last_error.code,
            )),
        }
    }

    /// Current bid/ask
    pub fn current_price(&mut self, symbol: &Symbol) -> TerminalResult<TickSnapshot> {
        self.guarded(|client| {
            let (tick, last_error) = client.last_tick(symbol)?;
            Ok(TerminalResult::from_last_error(
                last_error,
                Some(TickSnapshot {
                    bid: tick.bid,
                    ask: tick.ask,
                }),
            ))
        })
    }

    /// Time of the symbol's last tick
    pub fn last_tick_time(&mut self, symbol: &Symbol) -> TerminalResult<DateTime<Utc>> {
        self.guarded(|client| {
            let (tick, last_error) = client.last_tick(symbol)?;
            let time = Some(tick.time_msc)
                .filter(|&msc| msc > 0)
                .and_then(DateTime::from_timestamp_millis)
                .or_else(|| DateTime::from_timestamp(tick.time, 0))
                .ok_or_else(|| {
                    TerminalError::io(
                        format!("invalid tick time {} for {}", tick.time_msc, symbol.full_name),
                        last_error.code,
                    )
                })?;
            Ok(TerminalResult::from_last_error(last_error, Some(time)))
        })
    }

    // ========================================================================
    // Orders
    // ========================================================================

    fn send_order(
        &mut self,
        kind: OrderKind,
        symbol: &Symbol,
        volume: f64,
        policy: OrderPolicy,
        entry_price: Option<f64>,
        params: &OrderParams,
    ) -> Result<TerminalResult<OrderSendResult>, TerminalError> {
        let request = build_trade_request(
            kind,
            symbol,
            volume,
            self.config.deviation,
            policy,
            entry_price,
            params,
        );

        info!(
            "Placing order: {} {} {} @ {}",
            kind,
            volume,
            symbol.full_name,
            entry_price.map_or_else(|| "MKT".to_string(), |p| format!("{:.5}", p))
        );

        let Some(send_result) = self.terminal.order_send(&request) else {
            let last_error = self.last_error();
            return Err(TerminalError::io(
                format!("order_send returned nothing for {}", symbol.full_name),
                last_error.code,
            ));
        };

        if send_result.retcode != TRADE_RETCODE_DONE {
            warn!(
                "Order rejected: {} (retcode {})",
                send_result.comment, send_result.retcode
            );
            return Ok(TerminalResult::failure(
                send_result.comment.clone(),
                send_result.retcode as i32,
                Some(send_result),
            ));
        }

        info!(
            "Order placed: ticket {} deal {}",
            send_result.order, send_result.deal
        );
        let last_error = self.last_error();
        Ok(TerminalResult::from_last_error(last_error, Some(send_result)))
    }

    /// Place a pending order at `entry_price`
    pub fn set_pending_order(
        &mut self,
        kind: OrderKind,
        symbol: &Symbol,
        volume: f64,
        entry_price: f64,
        params: OrderParams,
    ) -> TerminalResult<OrderSendResult> {
        self.guarded(|client| {
            client.send_order(
                kind,
                symbol,
                volume,
                OrderPolicy::PENDING,
                Some(entry_price),
                &params,
            )
        })
    }

    /// Place a fill-or-kill order at market
    pub fn market_order(
        &mut self,
        kind: OrderKind,
        symbol: &Symbol,
        volume: f64,
        params: OrderParams,
    ) -> TerminalResult<OrderSendResult> {
        self.guarded(|client| {
            client.send_order(kind, symbol, volume, OrderPolicy::MARKET, None, &params)
        })
    }

    // ========================================================================
    // Account & History
    // ========================================================================

    pub fn account_info(&mut self) -> TerminalResult<AccountInfo> {
        self.guarded(|client| {
            let info = client.terminal.account_info();
            Ok(TerminalResult::from_last_error(client.last_error(), info))
        })
    }

    /// Working orders
    pub fn open_orders(&mut self) -> TerminalResult<Vec<TradeOrder>> {
        self.guarded(|client| {
            let orders = client.terminal.orders_get();
            Ok(TerminalResult::from_last_error(client.last_error(), orders))
        })
    }

    pub fn open_positions(&mut self) -> TerminalResult<Vec<TradePosition>> {
        self.guarded(|client| {
            let positions = client.terminal.positions_get();
            Ok(TerminalResult::from_last_error(client.last_error(), positions))
        })
    }

    /// Deals between two dates; missing bounds default to a year back through tomorrow.
    pub fn deal_history(
        &mut self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> TerminalResult<Vec<TradeDeal>> {
        self.guarded(|client| {
            let (default_from, default_to) = default_deal_window(Utc::now());
            let date_from = date_from.unwrap_or(default_from);
            let date_to = date_to.unwrap_or(default_to);
            debug!("history_deals_get {} -> {}", date_from, date_to);

            let deals = client.terminal.history_deals_get(date_from, date_to);
            Ok(TerminalResult::from_last_error(client.last_error(), deals))
        })
    }

    pub fn order_history(&mut self) -> TerminalResult<Vec<TradeOrder>> {
        self.guarded(|client| {
            let (date_from, date_to) = order_history_window();
            let orders = client.terminal.history_orders_get(date_from, date_to);
            Ok(TerminalResult::from_last_error(client.last_error(), orders))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::fake::{rates, send_result, ScriptedTerminal};
    use crate::terminal::{RES_E_FAIL, RES_S_OK, TRADE_RETCODE_REJECT};

    fn eurusd() -> Symbol {
        Symbol::with_full_name("EURUSD", "EURUSD.r")
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_init_failure_short_circuits_every_operation() {
        let mut client = TerminalClient::new(ScriptedTerminal::failing_init());
        let symbol = eurusd();

        let results = vec![
            client
                .copy_rates_range(&symbol, Timeframe::H1, ts(0), ts(3600), RangeOptions::default())
                .without_result::<()>(),
            client.copy_rates_from_pos(&symbol, Timeframe::H1, 0, 10).without_result(),
            client.copy_rates_from(&symbol, Timeframe::H1, ts(0), 10).without_result(),
            client.current_price(&symbol).without_result(),
            client.last_tick_time(&symbol).without_result(),
            client
                .set_pending_order(OrderKind::BuyLimit, &symbol, 0.1, 1.1, OrderParams::new())
                .without_result(),
            client
                .market_order(OrderKind::SellMarket, &symbol, 0.1, OrderParams::new())
                .without_result(),
            client.account_info().without_result(),
            client.open_orders().without_result(),
            client.open_positions().without_result(),
            client.deal_history(None, None).without_result(),
            client.order_history().without_result(),
        ];

        for result in &results {
            assert!(result.has_error);
            assert_eq!(result.result_code, -10003);
            assert!(result.message.contains("IPC initialize failed"));
        }
        assert_eq!(client.terminal().data_calls, 0);
        assert_eq!(client.terminal().init_calls, results.len());
        assert!(!client.is_open());
    }

    #[test]
    fn test_init_failure_result_is_absent() {
        let mut client = TerminalClient::new(ScriptedTerminal::failing_init());
        let result = client.account_info();
        assert!(result.has_error);
        assert!(result.result.is_none());
    }

    #[test]
    fn test_guard_body_not_run_on_init_failure() {
        let mut client = TerminalClient::new(ScriptedTerminal::failing_init());
        let mut runs = 0;
        let result: TerminalResult<()> = client.guarded(|_| {
            runs += 1;
            Ok(TerminalResult::success(()))
        });
        assert!(result.has_error);
        assert_eq!(runs, 0);
    }

    #[test]
    fn test_guard_converts_io_failure() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());
        client.terminal_mut().fail_with(-5, "Terminal: Call failed");

        let result: TerminalResult<()> =
            client.guarded(|_| Err(TerminalError::io("socket closed", -5)));

        assert!(result.has_error);
        assert_eq!(result.result_code, -5);
        assert_eq!(
            result.message,
            " mt5 msg :Terminal: Call failed , exception : socket closed"
        );
        assert!(result.result.is_none());
    }

    #[test]
    fn test_open_is_initialized_once() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());
        assert!(client.open().is_ok());
        assert!(client.is_open());

        client.account_info();
        client.open_orders();
        assert_eq!(client.terminal().init_calls, 1);

        client.close();
        assert!(!client.is_open());
        assert_eq!(client.terminal().shutdown_calls, 1);

        client.open_positions();
        assert_eq!(client.terminal().init_calls, 2);
    }

    #[test]
    fn test_failed_init_with_success_code_still_errors() {
        let mut terminal = ScriptedTerminal::failing_init();
        terminal.init_error = crate::result::LastError::new(RES_S_OK, "Success");
        let mut client = TerminalClient::new(terminal);

        let result = client.open();
        assert!(result.has_error);
        assert_eq!(result.result_code, crate::terminal::RES_E_INTERNAL_FAIL_INIT);
    }

    #[test]
    fn test_range_date_to_le_adds_one_bar() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());
        let options = RangeOptions {
            date_to_le: true,
            ..Default::default()
        };

        client.copy_rates_range(&eurusd(), Timeframe::H1, ts(0), ts(7_200), options);

        let (symbol, code, from, to) = client.terminal().range_args[0].clone();
        assert_eq!(symbol, "EURUSD.r");
        assert_eq!(code, Timeframe::H1.terminal_code());
        assert_eq!(from, ts(0));
        assert_eq!(to, ts(7_200 + 3_600));
    }

    #[test]
    fn test_range_date_from_gt_moves_start_past_end() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());
        let options = RangeOptions {
            date_to_le: true,
            date_from_gt: true,
        };

        client.copy_rates_range(&eurusd(), Timeframe::M15, ts(0), ts(900), options);

        let (_, _, from, to) = client.terminal().range_args[0].clone();
        assert_eq!(to, ts(1_800));
        assert_eq!(from, ts(2_700));
    }

    #[test]
    fn test_range_without_options_is_unchanged() {
        let (from, to) = RangeOptions::default().apply(ts(10), ts(20), Timeframe::D1);
        assert_eq!((from, to), (ts(10), ts(20)));
    }

    #[test]
    fn test_null_rows_with_failing_error_is_io_failure() {
        let mut terminal = ScriptedTerminal::new();
        terminal.range_rates = None;
        terminal.fail_with(RES_E_FAIL, "Terminal: Call failed");
        let mut client = TerminalClient::new(terminal);

        let result =
            client.copy_rates_range(&eurusd(), Timeframe::H1, ts(0), ts(1), RangeOptions::default());

        assert!(result.has_error);
        assert_eq!(result.result_code, RES_E_FAIL);
        assert!(result.result.is_none());
        assert!(result.message.contains("Terminal: Call failed"));
    }

    #[test]
    fn test_null_rows_with_success_code_is_empty_chart() {
        let mut terminal = ScriptedTerminal::new();
        terminal.range_rates = None;
        let mut client = TerminalClient::new(terminal);

        let result =
            client.copy_rates_range(&eurusd(), Timeframe::H1, ts(0), ts(1), RangeOptions::default());

        assert!(result.is_ok());
        let chart = result.result.unwrap();
        assert!(chart.is_empty());
        assert_eq!(chart.symbol, "EURUSD");
    }

    #[test]
    fn test_copy_rates_from_pos_uses_short_name() {
        let mut terminal = ScriptedTerminal::new();
        terminal.script(
            "EURUSD",
            vec![crate::terminal::fake::Poll::Rows(rates(1_700_000_000, 3))],
        );
        let mut client = TerminalClient::new(terminal);

        let result = client.copy_rates_from_pos(&eurusd(), Timeframe::M1, 0, 100);

        assert!(result.is_ok());
        assert_eq!(result.result.unwrap().len(), 3);
        assert_eq!(
            client.terminal().pos_args[0],
            ("EURUSD".to_string(), 1, 0, 100)
        );
    }

    #[test]
    fn test_copy_rates_from_builds_chart() {
        let mut terminal = ScriptedTerminal::new();
        terminal.from_rates = Some(rates(1_700_000_000, 4));
        let mut client = TerminalClient::new(terminal);

        let result = client.copy_rates_from(&eurusd(), Timeframe::M1, ts(1_700_000_300), 4);
        let chart = result.result.unwrap();
        assert_eq!(chart.len(), 4);
        assert_eq!(chart.timeframe, Timeframe::M1);
    }

    #[test]
    fn test_current_price() {
        let mut terminal = ScriptedTerminal::new();
        terminal.tick = Some(Tick {
            time: 1_700_000_000,
            bid: 1.0850,
            ask: 1.0852,
            last: 0.0,
            volume: 0,
            time_msc: 1_700_000_000_250,
        });
        let mut client = TerminalClient::new(terminal);

        let price = client.current_price(&eurusd());
        assert!(price.is_ok());
        assert_eq!(
            price.result,
            Some(TickSnapshot {
                bid: 1.0850,
                ask: 1.0852
            })
        );

        let time = client.last_tick_time(&eurusd()).result.unwrap();
        assert_eq!(time.timestamp_millis(), 1_700_000_000_250);
    }

    #[test]
    fn test_last_tick_time_falls_back_to_seconds() {
        let mut terminal = ScriptedTerminal::new();
        terminal.tick = Some(Tick {
            time: 1_700_000_000,
            bid: 1.0850,
            ask: 1.0852,
            last: 0.0,
            volume: 0,
            time_msc: 0,
        });
        let mut client = TerminalClient::new(terminal);

        let time = client.last_tick_time(&eurusd()).result.unwrap();
        assert_eq!(time, ts(1_700_000_000));
    }

    #[test]
    fn test_current_price_without_tick_is_error() {
        let mut terminal = ScriptedTerminal::new();
        terminal.fail_with(-4, "Terminal: Not found");
        let mut client = TerminalClient::new(terminal);

        let price = client.current_price(&eurusd());
        assert!(price.has_error);
        assert_eq!(price.result_code, -4);
        assert!(price.message.contains("no tick for EURUSD.r"));
    }

    #[test]
    fn test_order_success_code() {
        let mut terminal = ScriptedTerminal::new();
        terminal.send_result = Some(send_result(TRADE_RETCODE_DONE, "Request executed"));
        let mut client = TerminalClient::new(terminal);

        let result = client.set_pending_order(
            OrderKind::BuyLimit,
            &eurusd(),
            0.1,
            1.08,
            OrderParams::new().stop_loss(1.07).take_profit(1.10),
        );

        assert!(!result.has_error);
        assert_eq!(result.result.unwrap().order, 7001);
    }

    #[test]
    fn test_order_reject_carries_terminal_comment() {
        let mut terminal = ScriptedTerminal::new();
        terminal.send_result = Some(send_result(TRADE_RETCODE_REJECT, "Request rejected"));
        let mut client = TerminalClient::new(terminal);

        let result = client.market_order(
            OrderKind::SellMarket,
            &eurusd(),
            0.1,
            OrderParams::new().stop_loss(1.2),
        );

        assert!(result.has_error);
        assert_eq!(result.message, "Request rejected");
        assert_eq!(result.result_code, TRADE_RETCODE_REJECT as i32);
        assert!(result.result.is_some());
    }

    #[test]
    fn test_order_send_returning_nothing_is_io_failure() {
        let mut terminal = ScriptedTerminal::new();
        terminal.fail_with(-2, "Invalid \"volume\" argument");
        let mut client = TerminalClient::new(terminal);

        let result = client.market_order(OrderKind::BuyMarket, &eurusd(), 0.0, OrderParams::new());
        assert!(result.has_error);
        assert_eq!(result.result_code, -2);
        assert!(result.result.is_none());
    }

    #[test]
    fn test_pending_order_request_policy() {
        let mut terminal = ScriptedTerminal::new();
        terminal.send_result = Some(send_result(TRADE_RETCODE_DONE, "Request executed"));
        let mut client = TerminalClient::new(terminal);

        client.set_pending_order(
            OrderKind::SellLimit,
            &eurusd(),
            0.2,
            1.09,
            OrderParams::new().stop_loss(1.1).take_profit(1.05).magic(77),
        );

        let request = &client.terminal().requests[0];
        assert_eq!(request.symbol, "EURUSD.r");
        assert_eq!(request.action, OrderKind::SellLimit.terminal_action());
        assert_eq!(request.order_type, OrderKind::SellLimit.terminal_type());
        assert_eq!(request.type_time, ORDER_TIME_GTC);
        assert_eq!(request.type_filling, ORDER_FILLING_RETURN);
        assert_eq!(request.deviation, 10);
        assert_eq!(request.price, Some(1.09));
        assert_eq!(request.sl, Some(1.1));
        assert_eq!(request.tp, Some(1.05));
        assert_eq!(request.magic, Some(77));
        assert_eq!(request.external_id, None);
    }

    #[test]
    fn test_market_order_keeps_protection_without_price() {
        let mut terminal = ScriptedTerminal::new();
        terminal.send_result = Some(send_result(TRADE_RETCODE_DONE, "Request executed"));
        let mut client = TerminalClient::new(terminal);

        client.market_order(
            OrderKind::BuyMarket,
            &eurusd(),
            0.1,
            OrderParams::new()
                .stop_loss(1.07)
                .take_profit(1.12)
                .external_id("sig-42")
                .comment("breakout"),
        );

        let request = &client.terminal().requests[0];
        assert_eq!(request.type_filling, ORDER_FILLING_FOK);
        assert_eq!(request.price, None);
        assert_eq!(request.sl, Some(1.07));
        assert_eq!(request.tp, Some(1.12));
        assert_eq!(request.external_id.as_deref(), Some("sig-42"));
        assert_eq!(request.comment.as_deref(), Some("breakout"));
    }

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_missing_stop_loss_is_logged() {
        let without = captured_logs(|| {
            build_trade_request(
                OrderKind::SellLimit,
                &eurusd(),
                0.5,
                10,
                OrderPolicy::PENDING,
                Some(1.2),
                &OrderParams::new().take_profit(1.1),
            );
        });
        assert!(without.contains("WARN"));
        assert!(without.contains("Sell Limit 0.5 EURUSD.r sent without a stop loss"));

        let with = captured_logs(|| {
            build_trade_request(
                OrderKind::SellLimit,
                &eurusd(),
                0.5,
                10,
                OrderPolicy::PENDING,
                Some(1.2),
                &OrderParams::new().stop_loss(1.25),
            );
        });
        assert!(!with.contains("without a stop loss"));
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let request = build_trade_request(
            OrderKind::BuyMarket,
            &eurusd(),
            1.0,
            10,
            OrderPolicy::MARKET,
            None,
            &OrderParams::new(),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("price").is_none());
        assert!(json.get("sl").is_none());
        assert!(json.get("comment").is_none());
        assert_eq!(json["type"], 0);
    }

    #[test]
    fn test_queries_pass_through() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());

        let orders = client.open_orders();
        assert!(orders.is_ok());
        assert_eq!(orders.result, Some(vec![]));

        let account = client.account_info();
        assert!(account.is_ok());
        assert!(account.result.is_none());
    }

    #[test]
    fn test_query_error_from_last_error() {
        let mut terminal = ScriptedTerminal::new();
        terminal.positions = None;
        terminal.fail_with(-10004, "No IPC connection");
        let mut client = TerminalClient::new(terminal);

        let positions = client.open_positions();
        assert!(positions.has_error);
        assert_eq!(positions.result_code, -10004);
        assert!(positions.result.is_none());
    }

    #[test]
    fn test_history_windows() {
        let mut client = TerminalClient::new(ScriptedTerminal::new());

        client.deal_history(Some(ts(100)), Some(ts(200)));
        client.order_history();

        let args = &client.terminal().history_args;
        assert_eq!(args[0], (ts(100), ts(200)));
        assert_eq!(args[1], order_history_window());
    }

    #[test]
    fn test_default_deal_window() {
        let now = ts(1_700_000_000);
        let (from, to) = default_deal_window(now);
        assert_eq!(now - from, Duration::days(365));
        assert_eq!(to - now, Duration::days(1));
    }
}
