use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use mt5_overhead::terminal::replay::ReplayOptions;
use mt5_overhead::{
    stream_multiple_market_data, ClientConfig, OrderKind, OrderParams, RangeOptions,
    ReplayTerminal, Symbol, TerminalClient, TerminalResult, Timeframe,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding <SYMBOL>_<TF>.csv bar files
    #[arg(short, long, env = "MT5_REPLAY_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Bars visible before the first poll (default: all)
    #[arg(long)]
    initial_bars: Option<usize>,

    /// Bars revealed on every position-based fetch
    #[arg(long, default_value = "0")]
    reveal_per_poll: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch bars by date range, by start date, or by position
    Rates {
        symbol: String,
        #[arg(short, long, default_value = "M1")]
        timeframe: Timeframe,
        /// Range start (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Range end (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Extend --to by one bar
        #[arg(long)]
        to_le: bool,
        /// Only bars after --to
        #[arg(long)]
        from_gt: bool,
        #[arg(long, default_value = "0")]
        pos: usize,
        #[arg(short, long, default_value = "100")]
        count: usize,
    },
    /// Current bid/ask
    Price { symbol: String },
    /// Submit an order ("Buy Limit", "Buy Market", "Sell Limit", "Sell Market")
    Order {
        kind: OrderKind,
        symbol: String,
        volume: f64,
        /// Entry price, required for limit orders
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        sl: Option<f64>,
        #[arg(long)]
        tp: Option<f64>,
        #[arg(long)]
        magic: Option<u64>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Account state
    Account,
    /// Working orders
    Orders,
    /// Open positions
    Positions,
    /// Deal history (defaults to the past year)
    Deals {
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Order history
    History,
    /// List the order types that can be submitted
    OrderTypes,
    /// Stream new bars for one or more symbols
    Stream {
        /// Symbols to stream (comma-separated)
        #[arg(short, long, default_value = "EURUSD")]
        symbols: String,
        #[arg(short, long, default_value = "M1")]
        timeframe: Timeframe,
        /// Stop after this many updates
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn print_envelope<T: Serialize>(envelope: &TerminalResult<T>) -> Result<()> {
    print_json(envelope)?;
    if envelope.has_error {
        bail!(
            "terminal call failed: {} (code: {})",
            envelope.message,
            envelope.result_code
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mt5_overhead=info")),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env().context("Invalid MT5_* configuration")?;

    let options = ReplayOptions {
        initial_bars: args.initial_bars,
        reveal_per_poll: args.reveal_per_poll,
        ..Default::default()
    };
    let terminal = ReplayTerminal::with_options(&args.data_dir, options);
    let mut client = TerminalClient::with_config(terminal, config);

    let opened = client.open();
    info!("Terminal open: {}", opened.is_ok());

    let outcome = run(&mut client, args.command).await;
    client.close();
    outcome
}

async fn run(client: &mut TerminalClient<ReplayTerminal>, command: Command) -> Result<()> {
    match command {
        Command::Rates {
            symbol,
            timeframe,
            from,
            to,
            to_le,
            from_gt,
            pos,
            count,
        } => {
            let symbol = Symbol::new(symbol);
            let chart = match (from, to) {
                (Some(from), Some(to)) => client.copy_rates_range(
                    &symbol,
                    timeframe,
                    from,
                    to,
                    RangeOptions {
                        date_to_le: to_le,
                        date_from_gt: from_gt,
                    },
                ),
                (Some(from), None) => client.copy_rates_from(&symbol, timeframe, from, count),
                (None, Some(_)) => bail!("--to needs --from"),
                (None, None) => client.copy_rates_from_pos(&symbol, timeframe, pos, count),
            };
            print_envelope(&chart)
        }
        Command::Price { symbol } => print_envelope(&client.current_price(&Symbol::new(symbol))),
        Command::Order {
            kind,
            symbol,
            volume,
            price,
            sl,
            tp,
            magic,
            comment,
        } => {
            let symbol = Symbol::new(symbol);
            let mut params = OrderParams::new();
            params.stop_loss = sl;
            params.take_profit = tp;
            params.magic = magic;
            params.comment = comment;

            let result = if kind.is_pending() {
                let price = price.with_context(|| format!("{} needs --price", kind))?;
                client.set_pending_order(kind, &symbol, volume, price, params)
            } else {
                if price.is_some() {
                    warn!("--price is ignored for {}", kind);
                }
                client.market_order(kind, &symbol, volume, params)
            };
            print_envelope(&result)
        }
        Command::Account => print_envelope(&client.account_info()),
        Command::Orders => print_envelope(&client.open_orders()),
        Command::Positions => print_envelope(&client.open_positions()),
        Command::Deals { from, to } => print_envelope(&client.deal_history(from, to)),
        Command::History => print_envelope(&client.order_history()),
        Command::OrderTypes => print_json(&OrderKind::names()),
        Command::Stream {
            symbols,
            timeframe,
            limit,
        } => {
            let symbols: Vec<Symbol> = symbols
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(Symbol::new)
                .collect();
            if symbols.is_empty() {
                bail!("no symbols to stream");
            }

            info!(
                "Streaming {} {} every {:?}",
                symbols
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                timeframe,
                client.config().stream.poll_interval
            );

            let updates = stream_multiple_market_data(client, symbols, timeframe);
            futures::pin_mut!(updates);

            let mut received = 0;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping stream");
                        break;
                    }
                    update = updates.next() => {
                        let Some((symbol, result)) = update else { break };
                        if result.has_error {
                            warn!("{}: {} (code: {})", symbol, result.message, result.result_code);
                        }
                        print_json(&serde_json::json!({ "symbol": symbol, "update": result }))?;

                        received += 1;
                        if limit.is_some_and(|limit| received >= limit) {
                            break;
                        }
                    }
                }
            }
            Ok(())
        }
    }
}
