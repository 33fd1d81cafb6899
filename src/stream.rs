//! Incremental market-data streaming by polling
//!
//! On activation each symbol yields its recent history
//! ([`StreamConfig::history_count`] bars). After that, every
//! [`StreamConfig::poll_interval`] the last [`StreamConfig::refetch_window`] bars
//! are fetched again and only bars newer than the last one seen for that symbol
//! are yielded. A cycle without new bars yields nothing.
//!
//! There is no gap detection: if more than `refetch_window` bars close between
//! two polls, the older ones never reach the consumer.
//!
//! Symbols are polled one after another inside a cycle, so a cycle takes longer
//! with every symbol added and can drift past the nominal interval.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::TerminalClient;
use crate::config::StreamConfig;
use crate::market::{Chart, Symbol, Timeframe};
use crate::result::TerminalResult;
use crate::terminal::Terminal;

/// Polling state of one symbol
#[derive(Debug, Clone)]
struct Feed {
    symbol: Symbol,
    activated: bool,
    last_seen: Option<DateTime<Utc>>,
}

/// Drives poll cycles over a fixed set of symbols
#[derive(Debug, Clone)]
pub struct MarketDataPoller {
    timeframe: Timeframe,
    config: StreamConfig,
    feeds: Vec<Feed>,
}

impl MarketDataPoller {
    pub fn new(symbols: Vec<Symbol>, timeframe: Timeframe, config: StreamConfig) -> Self {
        let feeds = symbols
            .into_iter()
            .map(|symbol| Feed {
                symbol,
                activated: false,
                last_seen: None,
            })
            .collect();

        Self {
            timeframe,
            config,
            feeds,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Symbols whose activation fetch has not succeeded yet
    pub fn pending_activation(&self) -> usize {
        self.feeds.iter().filter(|f| !f.activated).count()
    }

    /// Timestamp of the newest bar yielded for `symbol`
    pub fn last_seen(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        self.feeds
            .iter()
            .find(|f| &f.symbol == symbol)
            .and_then(|f| f.last_seen)
    }

    /// Run one wake cycle and return what should be yielded, in order.
    pub fn poll_cycle<T: Terminal>(
        &mut self,
        client: &mut TerminalClient<T>,
    ) -> Vec<(Symbol, TerminalResult<Chart>)> {
        let mut updates = Vec::new();

        for feed in &mut self.feeds {
            let count = if feed.activated {
                self.config.refetch_window
            } else {
                self.config.history_count
            };

            let result =
                client.copy_latest_rates(&feed.symbol, self.timeframe, self.config.start_pos, count);

            let Some(chart) = result.result.clone() else {
                warn!(
                    "Market data poll failed for {}: {} (code: {})",
                    feed.symbol, result.message, result.result_code
                );
                updates.push((feed.symbol.clone(), result));
                continue;
            };

            if !feed.activated {
                debug!(
                    "Stream activated for {} with {} bars",
                    feed.symbol,
                    chart.len()
                );
                feed.activated = true;
                feed.last_seen = chart.last_time();
                updates.push((feed.symbol.clone(), result));
                continue;
            }

            let fresh = newer_than(chart, feed.last_seen);
            if fresh.is_empty() {
                continue;
            }

            debug!("{} new bars for {}", fresh.len(), feed.symbol);
            feed.last_seen = fresh.last_time();
            updates.push((feed.symbol.clone(), result.map(|_| fresh)));
        }

        updates
    }
}

/// Bars strictly newer than `last_seen`, oldest first.
fn newer_than(chart: Chart, last_seen: Option<DateTime<Utc>>) -> Chart {
    let mut bars: Vec<_> = chart
        .bars
        .into_iter()
        .filter(|bar| last_seen.map_or(true, |seen| bar.time > seen))
        .collect();
    bars.sort_by_key(|bar| bar.time);

    Chart {
        symbol: chart.symbol,
        timeframe: chart.timeframe,
        bars,
    }
}

struct StreamState<'a, T: Terminal> {
    client: &'a mut TerminalClient<T>,
    poller: MarketDataPoller,
    pending: VecDeque<(Symbol, TerminalResult<Chart>)>,
    first_cycle: bool,
    end_on_failed_activation: bool,
    finished: bool,
}

fn poll_stream<'a, T: Terminal + 'a>(
    client: &'a mut TerminalClient<T>,
    symbols: Vec<Symbol>,
    timeframe: Timeframe,
    end_on_failed_activation: bool,
) -> impl Stream<Item = (Symbol, TerminalResult<Chart>)> + 'a {
    let poller = MarketDataPoller::new(symbols, timeframe, client.config().stream.clone());
    let state = StreamState {
        client,
        poller,
        pending: VecDeque::new(),
        first_cycle: true,
        end_on_failed_activation,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(update) = state.pending.pop_front() {
                return Some((update, state));
            }
            if state.finished || state.poller.is_empty() {
                return None;
            }

            if state.first_cycle {
                state.first_cycle = false;
            } else {
                tokio::time::sleep(state.poller.poll_interval()).await;
            }

            let updates = state.poller.poll_cycle(&mut *state.client);
            state.pending.extend(updates);

            if state.end_on_failed_activation && state.poller.pending_activation() > 0 {
                state.finished = true;
            }
        }
    })
}

/// Stream bars of one symbol
///
/// Ends after yielding the error if the activation fetch fails. Later poll
/// failures are yielded and polling carries on.
pub fn stream_market_data<'a, T: Terminal + 'a>(
    client: &'a mut TerminalClient<T>,
    symbol: Symbol,
    timeframe: Timeframe,
) -> impl Stream<Item = TerminalResult<Chart>> + 'a {
    use futures::StreamExt;

    poll_stream(client, vec![symbol], timeframe, true).map(|(_, result)| result)
}

/// Stream bars of several symbols, tracking what was seen per symbol
///
/// A symbol whose activation fetch fails is retried on the next cycle.
pub fn stream_multiple_market_data<'a, T: Terminal + 'a>(
    client: &'a mut TerminalClient<T>,
    symbols: Vec<Symbol>,
    timeframe: Timeframe,
) -> impl Stream<Item = (Symbol, TerminalResult<Chart>)> + 'a {
    poll_stream(client, symbols, timeframe, false)
}
